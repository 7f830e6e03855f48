//! C1: the HCI command dispatcher. Owns a strict FIFO of outbound commands
//! and submits them to the controller one at a time, correlating each
//! `HCI_Command_Complete`/`HCI_Command_Status` with the caller that enqueued
//! it. Nothing here serializes against the advertising manager's own
//! enable/disable ordering — that's the caller's job, by choosing when to
//! call [`Dispatcher::enqueue`].

use std::collections::VecDeque;

use tracing::warn;

use crate::hci::cmd::Command;
use crate::hci::consts::MultiAdvtSubcmd;
use crate::hci::{Opcode, Status};

/// Invoked with the command's final status and, for a successful
/// `Command_Complete`, the return parameters with the leading status byte
/// already stripped.
pub type OnComplete = Box<dyn FnOnce(Status, Vec<u8>) + Send>;

/// Where a [`Dispatcher`] hands off encoded commands. Implemented by
/// whatever owns the actual transport; kept as a trait so the dispatcher's
/// FIFO and correlation logic can be exercised without one.
pub trait CommandSink: Send {
    fn send(&mut self, cmd: &Command);
}

struct Queued {
    opcode: Opcode,
    subcmd: Option<MultiAdvtSubcmd>,
    on_complete: OnComplete,
}

/// The sub-opcode of a vendor `LE_Multi_Advt` command is its first parameter
/// byte; every other command correlates on opcode alone.
fn subcmd_of(cmd: &Command) -> Option<MultiAdvtSubcmd> {
    (cmd.opcode == Opcode::LeMultiAdvt)
        .then(|| cmd.params.first().copied())
        .flatten()
        .and_then(|b| MultiAdvtSubcmd::try_from(b).ok())
}

/// FIFO command dispatcher, generic over the transport sink so it can be
/// unit tested against a recording stub.
pub struct Dispatcher<S> {
    sink: S,
    queue: VecDeque<(Command, Queued)>,
    in_flight: Option<Queued>,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Places `cmd` at the tail of the queue; `on_complete` runs once its
    /// matching completion event arrives.
    pub fn enqueue(&mut self, cmd: Command, on_complete: OnComplete) {
        let queued = Queued {
            opcode: cmd.opcode,
            subcmd: subcmd_of(&cmd),
            on_complete,
        };
        self.queue.push_back((cmd, queued));
        self.pump();
    }

    /// Returns the number of commands enqueued behind the in-flight one.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn pump(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        if let Some((cmd, queued)) = self.queue.pop_front() {
            self.sink.send(&cmd);
            self.in_flight = Some(queued);
        }
    }

    /// Feeds an `HCI_Command_Complete` event's opcode and return parameters
    /// (status byte included) to the dispatcher.
    pub fn on_command_complete(&mut self, opcode: Opcode, params: &[u8]) {
        let subcmd = (opcode == Opcode::LeMultiAdvt)
            .then(|| params.first().copied())
            .flatten()
            .and_then(|b| MultiAdvtSubcmd::try_from(b).ok());
        let Some(queued) = self.take_matching(opcode, subcmd) else {
            warn!(?opcode, "unmatched HCI_Command_Complete, dropping");
            return;
        };
        let body_start = if subcmd.is_some() { 2 } else { 1 };
        let status = params
            .get(body_start - 1)
            .copied()
            .map_or(Status::UnspecifiedError, Status::from);
        let body = params.get(body_start..).unwrap_or(&[]).to_vec();
        (queued.on_complete)(status, body);
        self.pump();
    }

    /// Feeds an `HCI_Command_Status` event. Used for commands whose real
    /// completion arrives as a later, distinct event (e.g. a classic mode
    /// change arrives as `HCI_Mode_Change`, not as this command's own
    /// completion) — the status here only reports whether the controller
    /// accepted the request.
    pub fn on_command_status(&mut self, opcode: Opcode, status: Status) {
        let Some(queued) = self.take_matching(opcode, None) else {
            warn!(?opcode, "unmatched HCI_Command_Status, dropping");
            return;
        };
        (queued.on_complete)(status, Vec::new());
        self.pump();
    }

    fn take_matching(&mut self, opcode: Opcode, subcmd: Option<MultiAdvtSubcmd>) -> Option<Queued> {
        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|q| q.opcode == opcode && q.subcmd == subcmd);
        matches.then(|| self.in_flight.take()).flatten()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::hci::Opcode;

    #[derive(Default, Clone)]
    struct RecordingSink(Arc<Mutex<Vec<Command>>>);

    impl CommandSink for RecordingSink {
        fn send(&mut self, cmd: &Command) {
            self.0.lock().unwrap().push(cmd.clone());
        }
    }

    #[test]
    fn submits_one_at_a_time_in_fifo_order() {
        let sink = RecordingSink::default();
        let mut d = Dispatcher::new(sink.clone());
        let fired = Arc::new(Mutex::new(Vec::new()));
        for opcode in [Opcode::Reset, Opcode::SetEventMask] {
            let fired = Arc::clone(&fired);
            d.enqueue(
                Command::new(opcode, Vec::new()),
                Box::new(move |_, _| fired.lock().unwrap().push(opcode)),
            );
        }
        assert_eq!(sink.0.lock().unwrap().len(), 1, "only first command submitted");
        assert_eq!(d.pending(), 1);

        d.on_command_complete(Opcode::Reset, &[0x00]);
        assert_eq!(*fired.lock().unwrap(), vec![Opcode::Reset]);
        assert_eq!(sink.0.lock().unwrap().len(), 2, "second command now submitted");

        d.on_command_complete(Opcode::SetEventMask, &[0x00]);
        assert_eq!(*fired.lock().unwrap(), vec![Opcode::Reset, Opcode::SetEventMask]);
    }

    #[test]
    fn unmatched_completion_is_dropped_without_advancing_queue() {
        let sink = RecordingSink::default();
        let mut d = Dispatcher::new(sink);
        let fired = Arc::new(Mutex::new(false));
        let f = Arc::clone(&fired);
        d.enqueue(
            Command::new(Opcode::Reset, Vec::new()),
            Box::new(move |_, _| *f.lock().unwrap() = true),
        );
        d.on_command_complete(Opcode::SetEventMask, &[0x00]);
        assert!(!*fired.lock().unwrap());
        d.on_command_complete(Opcode::Reset, &[0x00]);
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn multi_advt_completion_correlates_on_subcmd() {
        let sink = RecordingSink::default();
        let mut d = Dispatcher::new(sink);
        let fired = Arc::new(Mutex::new(false));
        let f = Arc::clone(&fired);
        d.enqueue(
            Command::new(Opcode::LeMultiAdvt, vec![MultiAdvtSubcmd::SetEnable as u8]),
            Box::new(move |_, _| *f.lock().unwrap() = true),
        );
        // Wrong subcmd in the completion: must not match.
        d.on_command_complete(
            Opcode::LeMultiAdvt,
            &[MultiAdvtSubcmd::SetParam as u8, 0x00],
        );
        assert!(!*fired.lock().unwrap());
        d.on_command_complete(
            Opcode::LeMultiAdvt,
            &[MultiAdvtSubcmd::SetEnable as u8, 0x00],
        );
        assert!(*fired.lock().unwrap());
    }
}
