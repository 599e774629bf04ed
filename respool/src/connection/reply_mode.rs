//! Tracking of the server's `CLIENT REPLY` setting.
//!
//! A client may ask the server to stop sending replies (`OFF`), to drop the
//! reply to the next command only (`SKIP`), or to resume (`ON`). The client
//! has to read exactly as many replies as the server sends, otherwise every
//! later read returns the reply of some other command. [`ReplyMode`] mirrors
//! the server's state so the connection knows whether a read is due.

use crate::cmd::{cmd, Cmd};

/// Whether the server currently answers commands on a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ReplyMode {
    /// Every command gets a reply. This is the state of a fresh connection.
    #[default]
    On,
    /// No command gets a reply until `CLIENT REPLY ON` is sent.
    Off,
    /// The next command gets no reply, later ones do.
    SkipNext,
}

/// How a command affects the reply mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplyOp {
    /// `CLIENT REPLY ON`
    ReplyOn,
    /// `CLIENT REPLY OFF`
    ReplyOff,
    /// `CLIENT REPLY SKIP`
    Skip,
    /// Any other command.
    Other,
}

impl ReplyOp {
    /// Classifies a command by its arguments, case-insensitively.
    pub fn of(cmd: &Cmd) -> ReplyOp {
        if cmd.len() != 3 {
            return ReplyOp::Other;
        }
        let is = |idx: usize, word: &[u8]| {
            cmd.arg_idx(idx)
                .is_some_and(|arg| arg.eq_ignore_ascii_case(word))
        };
        if !is(0, b"CLIENT") || !is(1, b"REPLY") {
            return ReplyOp::Other;
        }
        if is(2, b"ON") {
            ReplyOp::ReplyOn
        } else if is(2, b"OFF") {
            ReplyOp::ReplyOff
        } else if is(2, b"SKIP") {
            ReplyOp::Skip
        } else {
            ReplyOp::Other
        }
    }

    /// The command that performs this operation, if it is one of the
    /// `CLIENT REPLY` variants.
    pub fn command(self) -> Option<Cmd> {
        let mode = match self {
            ReplyOp::ReplyOn => "ON",
            ReplyOp::ReplyOff => "OFF",
            ReplyOp::Skip => "SKIP",
            ReplyOp::Other => return None,
        };
        let mut cmd = cmd("CLIENT");
        cmd.arg("REPLY").arg(mode);
        Some(cmd)
    }
}

/// What a connection has to do for one command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// The command has to be written to the server.
    pub send: bool,
    /// The server will answer the command, so exactly one reply must be read.
    pub read_reply: bool,
    /// The reply mode once the command was sent.
    pub next: ReplyMode,
}

impl ReplyMode {
    /// Computes what issuing a command classified as `op` entails.
    ///
    /// Requests that would not change anything on the server are not sent
    /// at all: switching replies on while they are on, off while they are
    /// off, and skipping while they are off. A server in `OFF` mode ignores
    /// `SKIP`, so sending it would be pointless.
    pub fn transition(self, op: ReplyOp) -> Transition {
        let (send, read_reply, next) = match (self, op) {
            (ReplyMode::On, ReplyOp::ReplyOn) => (false, false, ReplyMode::On),
            (ReplyMode::On, ReplyOp::ReplyOff) => (true, false, ReplyMode::Off),
            (ReplyMode::On, ReplyOp::Skip) => (true, false, ReplyMode::SkipNext),
            (ReplyMode::On, ReplyOp::Other) => (true, true, ReplyMode::On),

            (ReplyMode::Off, ReplyOp::ReplyOn) => (true, true, ReplyMode::On),
            (ReplyMode::Off, ReplyOp::ReplyOff) => (false, false, ReplyMode::Off),
            (ReplyMode::Off, ReplyOp::Skip) => (false, false, ReplyMode::Off),
            (ReplyMode::Off, ReplyOp::Other) => (true, false, ReplyMode::Off),

            (ReplyMode::SkipNext, ReplyOp::ReplyOn) => (true, true, ReplyMode::On),
            (ReplyMode::SkipNext, ReplyOp::ReplyOff) => (true, false, ReplyMode::Off),
            (ReplyMode::SkipNext, ReplyOp::Skip) => (true, false, ReplyMode::SkipNext),
            (ReplyMode::SkipNext, ReplyOp::Other) => (true, false, ReplyMode::On),
        };
        Transition {
            send,
            read_reply,
            next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReplyMode::*;
    use ReplyOp::*;

    fn reads(start: ReplyMode, ops: &[ReplyOp]) -> (usize, ReplyMode) {
        ops.iter().fold((0, start), |(count, mode), op| {
            let t = mode.transition(*op);
            (count + usize::from(t.read_reply), t.next)
        })
    }

    #[test]
    fn classifies_client_reply_commands() {
        assert_eq!(ReplyOp::of(cmd("client").arg("reply").arg("on")), ReplyOn);
        assert_eq!(ReplyOp::of(cmd("CLIENT").arg("REPLY").arg("Off")), ReplyOff);
        assert_eq!(ReplyOp::of(cmd("CLIENT").arg("REPLY").arg("SKIP")), Skip);
        assert_eq!(ReplyOp::of(&cmd("PING")), Other);
        assert_eq!(ReplyOp::of(cmd("CLIENT").arg("SETNAME").arg("on")), Other);
        assert_eq!(ReplyOp::of(cmd("CLIENT").arg("REPLY").arg("ON").arg("x")), Other);
    }

    #[test]
    fn commands_round_trip_through_classifier() {
        for op in [ReplyOn, ReplyOff, Skip] {
            assert_eq!(ReplyOp::of(&op.command().unwrap()), op);
        }
        assert_eq!(Other.command(), None);
    }

    #[test]
    fn off_then_on_reads_once_regardless_of_commands_between() {
        for n in 0..10 {
            let mut ops = vec![ReplyOff];
            ops.extend(std::iter::repeat(Other).take(n));
            ops.push(ReplyOn);
            assert_eq!(reads(On, &ops), (1, On), "n = {n}");
        }
    }

    #[test]
    fn skip_suppresses_exactly_one_reply() {
        assert_eq!(reads(On, &[Skip, Other]), (0, On));
        assert_eq!(reads(On, &[Skip, Other, Other]), (1, On));
    }

    #[test]
    fn redundant_requests_are_not_sent() {
        assert!(!On.transition(ReplyOn).send);
        assert!(!Off.transition(ReplyOff).send);
        assert!(!Off.transition(Skip).send);
        assert_eq!(Off.transition(Skip).next, Off);
    }

    #[test]
    fn compound_toggling() {
        // skip then off: the OFF command itself is the skipped one
        assert_eq!(reads(On, &[Skip, ReplyOff, Other, Other]), (0, Off));
        // skip then on: ON cancels the pending skip and is answered
        assert_eq!(reads(On, &[Skip, ReplyOn, Other]), (2, On));
        // skip twice still suppresses only the next real command
        assert_eq!(reads(On, &[Skip, Skip, Other, Other]), (1, On));
        // skip while off changes nothing
        assert_eq!(reads(Off, &[Skip, ReplyOn, Other]), (2, On));
    }
}
