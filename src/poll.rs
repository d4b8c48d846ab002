//! Status poll loop: a pure decision core plus a driver loop executing
//! its steps against the bus.
//!
//! The device has no interrupt or ACK signalling, so readiness is
//! established by re-reading the status register and granting run time
//! until the buffers reach the expected shape. Splitting the decision out
//! of the loop keeps the iteration bound and the run-time escalation
//! testable without a bus.

use crate::adapter::{Adapter, Container};
use crate::driver::Tunables;
use crate::fragment::HEADER_LEN;
use crate::framer::Bus;
use crate::result::Error;
use crate::status::{
    StatusSnapshot, SUB_FIRST_BIRTHDAY, SUB_MASTER_ERASE, SUB_NEEDS_MORE_TIME,
    SUB_RESPONSE_INCOMPLETE, SUB_VM_INCOMPLETE,
};
use crate::timing::{MAX_RUNTIME_CODE, MIN_RUNTIME_CODE};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Poll iterations before the device is declared unrecoverable
pub(crate) const POLL_LIMIT: u32 = 200;

/// Run-time code the device gets after a first-birthday condition
const FIRST_BIRTHDAY_RUNTIME: u8 = 6;

/// Escalation applied while the co-processor reports busy
const BUSY_RUNTIME_STEP: u8 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Send,
    Receive,
}

/// What the poll loop should do next
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Device is ready for the requested direction
    Ready,
    /// Run the POR recovery procedure, armed at most once per attempt
    PorRecover,
    /// Grant run time without touching the status register
    Run(u8),
    /// Write the run-time code to the status register, then run
    WriteStatusRun(u8),
    /// Zero-duration run; the device is mid-transaction and needs no
    /// backoff. `bump_read_runtime` asks for more reply staging time.
    RunZero { bump_read_runtime: bool },
    Fail(Fault),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Fault {
    PorUncorrected,
    Unrecoverable,
    NoRoom,
    NoHeader,
    BadHeader(u8),
}

impl Fault {
    fn into_error<E: Sized + Debug>(self) -> Error<E> {
        match self {
            Fault::PorUncorrected => Error::PorUncorrected,
            Fault::Unrecoverable => Error::Unrecoverable,
            Fault::NoRoom => Error::NoRoomInBuffer,
            Fault::NoHeader => Error::NoHeader,
            Fault::BadHeader(used) => Error::BadHeader(used),
        }
    }
}

/// Decision state for one transfer attempt
///
/// The POR-recovery arming survives across the send and receive polls of
/// an attempt; the iteration counter and run-time code restart with every
/// [`PollPolicy::begin`].
pub(crate) struct PollPolicy {
    runtime: u8,
    por_armed: bool,
    iterations: u32,
}

impl PollPolicy {
    pub fn new() -> Self {
        PollPolicy {
            runtime: MIN_RUNTIME_CODE,
            por_armed: true,
            iterations: 0,
        }
    }

    pub fn begin(&mut self, runtime: u8) {
        self.runtime = runtime.min(MAX_RUNTIME_CODE);
        self.iterations = 0;
    }

    #[cfg(test)]
    pub fn runtime(&self) -> u8 {
        self.runtime
    }

    /// One poll decision, mirroring the device's documented status
    /// conditions in priority order
    pub fn decide(&mut self, direction: Direction, snap: &StatusSnapshot) -> Step {
        self.iterations += 1;
        // legitimately long-running internal operation (key generation
        // and the like): the bound starts over
        if snap.sub_code() == SUB_NEEDS_MORE_TIME {
            self.iterations = 0;
        }
        if self.iterations > POLL_LIMIT {
            return Step::Fail(Fault::Unrecoverable);
        }

        if snap.por() {
            return if self.por_armed {
                self.por_armed = false;
                Step::PorRecover
            } else {
                Step::Fail(Fault::PorUncorrected)
            };
        }

        if snap.coprocessor_busy() {
            self.runtime = (self.runtime + BUSY_RUNTIME_STEP).min(MAX_RUNTIME_CODE);
            return Step::Run(self.runtime);
        }

        if snap.sub_code() == SUB_FIRST_BIRTHDAY {
            self.runtime = FIRST_BIRTHDAY_RUNTIME;
            return Step::WriteStatusRun(self.runtime);
        }

        if snap.sub_code() == SUB_MASTER_ERASE {
            self.runtime = (self.runtime + 1).min(MAX_RUNTIME_CODE);
            return Step::WriteStatusRun(self.runtime);
        }

        if snap.command_not_complete() {
            self.runtime = if self.runtime == MIN_RUNTIME_CODE {
                2
            } else {
                (self.runtime * 2).min(MAX_RUNTIME_CODE)
            };
            return Step::WriteStatusRun(self.runtime);
        }

        if snap.sub_code() == SUB_RESPONSE_INCOMPLETE {
            return Step::RunZero {
                bump_read_runtime: false,
            };
        }

        if snap.sub_code() == SUB_VM_INCOMPLETE && snap.used_out == 0 {
            return Step::RunZero {
                bump_read_runtime: true,
            };
        }

        match direction {
            Direction::Send => {
                if snap.free_in as usize >= HEADER_LEN {
                    Step::Ready
                } else {
                    Step::Fail(Fault::NoRoom)
                }
            }
            Direction::Receive => {
                if snap.used_out as usize == HEADER_LEN {
                    Step::Ready
                } else if snap.used_out == 0 {
                    Step::Fail(Fault::NoHeader)
                } else {
                    Step::Fail(Fault::BadHeader(snap.used_out))
                }
            }
        }
    }
}

/// Poll the status register until the device is ready for `direction`,
/// returning the snapshot that satisfied the readiness check
pub(crate) fn poll_until_ready<A: Adapter, C: Container<A>, D: DelayNs>(
    bus: &mut Bus<'_, A, C, D>,
    policy: &mut PollPolicy,
    direction: Direction,
    runtime: u8,
    tunables: &mut Tunables,
) -> Result<StatusSnapshot, Error<A::Error>> {
    policy.begin(runtime);
    loop {
        let snap = bus.read_status()?;
        match policy.decide(direction, &snap) {
            Step::Ready => return Ok(snap),
            Step::PorRecover => {
                link_warn!("device POR, running recovery");
                let code = MIN_RUNTIME_CODE
                    .saturating_add(tunables.por_adjust)
                    .min(MAX_RUNTIME_CODE);
                bus.adapter.reset()?;
                bus.write_status(code)?;
                bus.run(code)?;
            }
            Step::Run(code) => bus.run(code)?,
            Step::WriteStatusRun(code) => {
                bus.write_status(code)?;
                bus.run(code)?;
            }
            Step::RunZero { bump_read_runtime } => {
                if bump_read_runtime {
                    tunables.min_read_runtime =
                        (tunables.min_read_runtime + 1).min(MAX_RUNTIME_CODE);
                }
                bus.run(MIN_RUNTIME_CODE)?;
            }
            Step::Fail(fault) => return Err(fault.into_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{POR_FLAG, SUB_COMMAND_COMPLETE};

    fn snap(free_in: u8, used_out: u8, op_status: u8, busy: u8) -> StatusSnapshot {
        StatusSnapshot::decode(&[free_in, used_out, op_status, busy])
    }

    fn busy_snap() -> StatusSnapshot {
        snap(0x7F, 0, 0, 0x01)
    }

    #[test]
    fn steady_state_send() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        assert_eq!(
            policy.decide(Direction::Send, &snap(8, 0, 0, 0)),
            Step::Ready
        );
        assert_eq!(
            policy.decide(Direction::Send, &snap(7, 0, 0, 0)),
            Step::Fail(Fault::NoRoom)
        );
    }

    #[test]
    fn steady_state_receive() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 8, SUB_COMMAND_COMPLETE, 0)),
            Step::Ready
        );
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 0, 0, 0)),
            Step::Fail(Fault::NoHeader)
        );
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 3, 0, 0)),
            Step::Fail(Fault::BadHeader(3))
        );
    }

    #[test]
    fn not_complete_escalates_runtime() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        let not_complete = snap(0, 0, 0x20, 0);

        assert_eq!(
            policy.decide(Direction::Send, &not_complete),
            Step::WriteStatusRun(2)
        );
        assert_eq!(
            policy.decide(Direction::Send, &not_complete),
            Step::WriteStatusRun(4)
        );
        assert_eq!(
            policy.decide(Direction::Send, &not_complete),
            Step::WriteStatusRun(8)
        );
        // doubling saturates at the 4-bit ceiling
        assert_eq!(
            policy.decide(Direction::Send, &not_complete),
            Step::WriteStatusRun(15)
        );
        assert_eq!(
            policy.decide(Direction::Send, &not_complete),
            Step::WriteStatusRun(15)
        );
    }

    #[test]
    fn busy_coprocessor_escalates_by_six() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        assert_eq!(policy.decide(Direction::Send, &busy_snap()), Step::Run(6));
        assert_eq!(policy.decide(Direction::Send, &busy_snap()), Step::Run(12));
        assert_eq!(policy.decide(Direction::Send, &busy_snap()), Step::Run(15));
    }

    #[test]
    fn birthday_and_erase_runtimes() {
        let mut policy = PollPolicy::new();
        policy.begin(3);
        assert_eq!(
            policy.decide(Direction::Send, &snap(0, 0, SUB_FIRST_BIRTHDAY, 0)),
            Step::WriteStatusRun(6)
        );
        policy.begin(3);
        assert_eq!(
            policy.decide(Direction::Send, &snap(0, 0, SUB_MASTER_ERASE, 0)),
            Step::WriteStatusRun(4)
        );
    }

    #[test]
    fn mid_transaction_codes_run_without_backoff() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 8, SUB_RESPONSE_INCOMPLETE, 0)),
            Step::RunZero {
                bump_read_runtime: false
            }
        );
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 0, SUB_VM_INCOMPLETE, 0)),
            Step::RunZero {
                bump_read_runtime: true
            }
        );
        // staged output present: the vm-incomplete code falls through to
        // the steady-state shape check
        assert_eq!(
            policy.decide(Direction::Receive, &snap(0, 5, SUB_VM_INCOMPLETE, 0)),
            Step::Fail(Fault::BadHeader(5))
        );
    }

    #[test]
    fn por_recovery_is_armed_once() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        let por = snap(0, 0, POR_FLAG, 0);
        assert_eq!(policy.decide(Direction::Send, &por), Step::PorRecover);
        assert_eq!(
            policy.decide(Direction::Send, &por),
            Step::Fail(Fault::PorUncorrected)
        );
    }

    #[test]
    fn arming_survives_begin_within_an_attempt() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        let por = snap(0, 0, POR_FLAG, 0);
        assert_eq!(policy.decide(Direction::Send, &por), Step::PorRecover);
        policy.begin(4);
        assert_eq!(
            policy.decide(Direction::Receive, &por),
            Step::Fail(Fault::PorUncorrected)
        );
    }

    #[test]
    fn poll_bound_fails_after_two_hundred_iterations() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        for _ in 0..POLL_LIMIT {
            assert!(matches!(
                policy.decide(Direction::Send, &busy_snap()),
                Step::Run(_)
            ));
        }
        assert_eq!(
            policy.decide(Direction::Send, &busy_snap()),
            Step::Fail(Fault::Unrecoverable)
        );
    }

    #[test]
    fn needs_more_time_resets_the_bound() {
        let mut policy = PollPolicy::new();
        policy.begin(0);
        for _ in 0..150 {
            policy.decide(Direction::Send, &busy_snap());
        }
        // long-running internal operation, busy flag still up
        let sentinel = snap(0, 0, SUB_NEEDS_MORE_TIME, 0x01);
        assert!(matches!(
            policy.decide(Direction::Send, &sentinel),
            Step::Run(_)
        ));
        for _ in 0..POLL_LIMIT {
            assert!(matches!(
                policy.decide(Direction::Send, &busy_snap()),
                Step::Run(_)
            ));
        }
        assert_eq!(
            policy.decide(Direction::Send, &busy_snap()),
            Step::Fail(Fault::Unrecoverable)
        );
    }

    #[test]
    fn escalated_runtime_is_observable() {
        let mut policy = PollPolicy::new();
        policy.begin(9);
        policy.decide(Direction::Send, &busy_snap());
        assert_eq!(policy.runtime(), 15);
    }
}
