//! Transfer orchestrator: sequences the framer, fragmenter and status
//! poll into a full application-data-unit exchange with multi-layer retry.

use crate::adapter::{Adapter, Container, Speed};
use crate::address::Address;
use crate::fragment::{Fragmenter, Reassembler, MAX_BLOCK_DATA};
use crate::framer::Bus;
use crate::poll::{poll_until_ready, Direction, PollPolicy};
use crate::result::Error;
use crate::status::SUB_COMMAND_COMPLETE;
use crate::timing::{Timing, MAX_RUNTIME_CODE, MIN_RUNTIME_CODE};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Whole-transfer attempts before the last error is re-raised
const TRANSFER_ATTEMPTS: u8 = 3;

/// Per-link timing tunables mutated by the retry machinery
pub(crate) struct Tunables {
    /// Run-time code for reply staging between receive polls; bumped when
    /// the device keeps reporting an incomplete VM with an empty output
    /// buffer, and after receive-phase failures
    pub min_read_runtime: u8,
    /// Extra run time granted during POR recovery, grows with every
    /// failed transfer attempt
    pub por_adjust: u8,
}

struct Failure<E: Sized + Debug> {
    error: Error<E>,
    in_receive: bool,
}

/// Link driver for one secure co-processor device
///
/// Owns no bus resources: the adapter, the owning container and the delay
/// provider are borrowed for the duration of each call. `&mut self` gives
/// the per-device mutual exclusion the shared scratch of earlier designs
/// needed a lock for.
pub struct Link {
    address: Address,
    timing: Timing,
    tunables: Tunables,
}

impl Link {
    pub fn new(address: Address, timing: Timing) -> Self {
        Link {
            address,
            timing,
            tunables: Tunables {
                min_read_runtime: MIN_RUNTIME_CODE,
                por_adjust: 0,
            },
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn timing_mut(&mut self) -> &mut Timing {
        &mut self.timing
    }

    /// Exchange one application data unit: fragment and send `payload`,
    /// grant the device `runtime_code` to work, then collect and
    /// reassemble its reply into `reply`, returning the reply length.
    ///
    /// The bus must already be at overdrive speed and the caller must hold
    /// exclusive adapter access for the whole call. Retries the complete
    /// exchange up to two more times with escalated timing before
    /// re-raising the last error.
    pub fn transfer<A: Adapter, C: Container<A>, D: DelayNs>(
        &mut self,
        adapter: &mut A,
        container: &mut C,
        delay: &mut D,
        payload: &[u8],
        runtime_code: u8,
        reply: &mut [u8],
    ) -> Result<usize, Error<A::Error>> {
        let mut code = runtime_code.min(MAX_RUNTIME_CODE);
        let mut last = Error::Unrecoverable;

        for attempt in 0..TRANSFER_ATTEMPTS {
            if attempt > 0 {
                container.renegotiate_speed(adapter)?;
                code = (code + 1).min(MAX_RUNTIME_CODE);
                self.tunables.por_adjust = self.tunables.por_adjust.saturating_add(1);
            }

            match self.attempt(adapter, container, delay, payload, code, reply) {
                Ok(len) => return Ok(len),
                Err(Failure { error, in_receive }) => {
                    if in_receive {
                        self.tunables.min_read_runtime =
                            (self.tunables.min_read_runtime + 1).min(MAX_RUNTIME_CODE);
                    }
                    last = error;
                }
            }
        }

        Err(last)
    }

    fn attempt<A: Adapter, C: Container<A>, D: DelayNs>(
        &mut self,
        adapter: &mut A,
        container: &mut C,
        delay: &mut D,
        payload: &[u8],
        code: u8,
        reply: &mut [u8],
    ) -> Result<usize, Failure<A::Error>> {
        let send = |error| Failure {
            error,
            in_receive: false,
        };
        let recv = |error| Failure {
            error,
            in_receive: true,
        };

        if adapter.speed() != Speed::Overdrive {
            return Err(send(Error::WrongSpeed));
        }

        let mut policy = PollPolicy::new();
        let mut frag = Fragmenter::new(payload).map_err(send)?;
        let mut bus = Bus {
            adapter,
            container,
            delay,
            address: &self.address,
            timing: &self.timing,
        };

        loop {
            poll_until_ready(
                &mut bus,
                &mut policy,
                Direction::Send,
                MIN_RUNTIME_CODE,
                &mut self.tunables,
            )
            .map_err(send)?;

            let (header, data) = frag.next_block();
            bus.write_header(&header).map_err(send)?;
            bus.write_data(data).map_err(send)?;

            if frag.has_more() {
                bus.write_status(MIN_RUNTIME_CODE).map_err(send)?;
                bus.run(MIN_RUNTIME_CODE).map_err(send)?;
            } else {
                bus.write_status(code).map_err(send)?;
                bus.run(code).map_err(send)?;
                break;
            }
        }

        let mut reasm = Reassembler::new(reply);
        loop {
            let snap = poll_until_ready(
                &mut bus,
                &mut policy,
                Direction::Receive,
                code,
                &mut self.tunables,
            )
            .map_err(recv)?;

            let header = bus.read_header().map_err(recv)?;
            if header.len as usize > MAX_BLOCK_DATA {
                return Err(recv(Error::BadHeader(header.len)));
            }
            let mut buf = [0u8; MAX_BLOCK_DATA];
            let data = &mut buf[..header.len as usize];
            bus.read_data(data).map_err(recv)?;
            reasm.accept_block(&header, data).map_err(recv)?;

            if snap.sub_code() == SUB_COMMAND_COMPLETE {
                break;
            }
            let staging = self.tunables.min_read_runtime;
            bus.write_status(staging).map_err(recv)?;
            bus.run(staging).map_err(recv)?;
        }

        Ok(reasm.finish())
    }

    /// Grant the device run time outside of a transfer
    pub fn run<A: Adapter, C: Container<A>, D: DelayNs>(
        &mut self,
        adapter: &mut A,
        container: &mut C,
        delay: &mut D,
        runtime_code: u8,
    ) -> Result<(), Error<A::Error>> {
        self.bus(adapter, container, delay).run(runtime_code)
    }

    /// Interrupt whatever the co-processor is currently executing
    pub fn interrupt<A: Adapter, C: Container<A>, D: DelayNs>(
        &mut self,
        adapter: &mut A,
        container: &mut C,
        delay: &mut D,
        runtime_code: u8,
    ) -> Result<(), Error<A::Error>> {
        self.bus(adapter, container, delay).interrupt(runtime_code)
    }

    /// Reset the co-processor's micro-controller
    pub fn reset_device<A: Adapter, C: Container<A>, D: DelayNs>(
        &mut self,
        adapter: &mut A,
        container: &mut C,
        delay: &mut D,
    ) -> Result<(), Error<A::Error>> {
        self.bus(adapter, container, delay).reset_micro()
    }

    fn bus<'a, A: Adapter, C: Container<A>, D: DelayNs>(
        &'a self,
        adapter: &'a mut A,
        container: &'a mut C,
        delay: &'a mut D,
    ) -> Bus<'a, A, C, D> {
        Bus {
            adapter,
            container,
            delay,
            address: &self.address,
            timing: &self.timing,
        }
    }
}
