//! Control-mode output parser.
//!
//! Consumes the byte stream of one control client. Two shapes arrive
//! interleaved on stdout:
//!
//! - Reply envelopes: `%begin <t> <n> <f>` … payload … `%end|%error
//!   <t> <n> <f>`, where the three integer guards of the terminator must
//!   equal those of the begin. Anything between them, including lines
//!   that merely look like terminators with the wrong guards or a stray
//!   inner `%begin`, is payload.
//! - Single-line `%…` notifications, which map to refresh flags.
//!
//! The parser never consumes bytes it has not fully classified: an
//! incomplete line or an unterminated envelope yields [`Step::NeedMore`]
//! and is retried when more bytes arrive. NUL bytes in the ring are
//! chunk separators from the read helper and are skipped everywhere.

use log::warn;

use crate::error::{Error, Result};
use crate::refresh::RefreshFlags;
use crate::ring::Ring;

/// Outcome of one parsing step.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Not enough buffered bytes to classify or finish anything.
    NeedMore,
    /// A line was consumed with nothing to report.
    Consumed,
    /// A notification was consumed; schedule these reloads.
    Refresh(RefreshFlags),
    /// A complete reply envelope was consumed.
    Reply {
        payload: Vec<u8>,
        is_error: bool,
    },
    /// `%exit`: the server is detaching this client.
    Exit,
}

/// The notifications we recognize, in the scan order of [`NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Begin,
    End,
    ClientSessionChanged,
    Exit,
    LayoutChange,
    Output,
    PaneModeChanged,
    SessionChanged,
    SessionRenamed,
    SessionWindowChanged,
    SessionsChanged,
    UnlinkedWindowAdd,
    UnlinkedWindowClose,
    UnlinkedWindowRenamed,
    WindowAdd,
    WindowClose,
    WindowPaneChanged,
    WindowRenamed,
}

/// Notification names without the leading `%`, paired with their command.
const NAMES: &[(&str, Command)] = &[
    ("begin", Command::Begin),
    ("end", Command::End),
    ("client-session-changed", Command::ClientSessionChanged),
    ("exit", Command::Exit),
    ("layout-change", Command::LayoutChange),
    ("output", Command::Output),
    ("pane-mode-changed", Command::PaneModeChanged),
    ("session-changed", Command::SessionChanged),
    ("session-renamed", Command::SessionRenamed),
    ("session-window-changed", Command::SessionWindowChanged),
    ("sessions-changed", Command::SessionsChanged),
    ("unlinked-window-add", Command::UnlinkedWindowAdd),
    ("unlinked-window-close", Command::UnlinkedWindowClose),
    ("unlinked-window-renamed", Command::UnlinkedWindowRenamed),
    ("window-add", Command::WindowAdd),
    ("window-close", Command::WindowClose),
    ("window-pane-changed", Command::WindowPaneChanged),
    ("window-renamed", Command::WindowRenamed),
];

#[derive(Debug, PartialEq, Eq)]
enum Ident {
    NeedMore,
    Known(Command),
    /// A `%` line we do not recognize.
    Unknown,
    /// The buffer does not even start with `%`.
    NotControl,
}

/// Scan the ring prefix for a notification name without consuming.
fn identify(ring: &Ring) -> Ident {
    if ring.is_empty() {
        return Ident::NeedMore;
    }

    'names: for (name, command) in NAMES {
        let mut expect = None; // None: want '%', Some(i): want name[i]
        for val in ring.iter() {
            if val == 0 {
                continue;
            }
            match expect {
                None => {
                    if val != b'%' {
                        return Ident::NotControl;
                    }
                    expect = Some(0);
                }
                Some(i) if i == name.len() => {
                    if val == b' ' || val == b'\n' {
                        return Ident::Known(*command);
                    }
                    continue 'names;
                }
                Some(i) => {
                    if val != name.as_bytes()[i] {
                        continue 'names;
                    }
                    expect = Some(i + 1);
                }
            }
        }
        // Ran out of bytes while this name still matched.
        return Ident::NeedMore;
    }

    Ident::Unknown
}

/// Drop chunk-separator NULs sitting at the head of the ring.
fn trim_leading_nuls(ring: &mut Ring) {
    let nuls = ring.iter().take_while(|&val| val == 0).count();
    ring.pop(nuls);
}

/// Pop the line at the head of the ring. Returns the number of bytes
/// removed, or `None` if no complete line is buffered yet.
fn consume_line(ring: &mut Ring) -> Option<usize> {
    let pos = ring.iter().position(|val| val == b'\n')?;
    ring.pop(pos + 1);
    trim_leading_nuls(ring);
    Some(pos + 1)
}

/// The three guard integers of an envelope header or terminator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Guards {
    time: u64,
    num: u64,
    flags: u64,
}

#[derive(Debug, Clone, Copy)]
enum BeginState {
    /// Matching a literal (`%begin `, `%end `, `%error `); the index is
    /// the next byte of the literal we expect.
    Literal(usize),
    Time,
    Num,
    Flags,
    /// At the start of a payload line, deciding whether it opens a
    /// terminator. The index is into `%e`… while end/error agree.
    LineStart(usize),
    /// Mid payload line; wait for the newline.
    Skip,
}

/// Consume a full `%begin … %end|%error` envelope from the head of the
/// ring. Returns the payload (NUL-stripped) and whether the terminator
/// was `%error`, or `None` when the envelope is still incomplete.
fn process_begin(ring: &mut Ring) -> Result<Option<(Vec<u8>, bool)>> {
    const BEGIN: &[u8] = b"%begin ";
    const END: &[u8] = b"%end ";
    const ERROR: &[u8] = b"%error ";

    let mut literal: &[u8] = BEGIN;
    let mut in_header = true;
    let mut header = Guards::default();
    let mut candidate = Guards::default();
    let mut is_error = false;

    // Payload span in raw ring positions; `len` only ever extends to a
    // completed line boundary.
    let mut start = 0usize;
    let mut len = 0usize;

    // Raw byte count consumed once the terminator matches; the ring can
    // only be popped after the scanning borrow ends.
    let mut done: Option<usize> = None;

    let mut state = BeginState::Literal(0);
    for (pos, val) in ring.iter().enumerate() {
        if val == 0 {
            continue;
        }

        match state {
            BeginState::Literal(index) => {
                if literal.get(index) != Some(&val) {
                    if in_header {
                        return Err(Error::parse("malformed %begin header"));
                    }
                    state = if val == b'\n' {
                        len = pos + 1 - start;
                        BeginState::LineStart(0)
                    } else {
                        BeginState::Skip
                    };
                    continue;
                }
                state = if index + 1 == literal.len() {
                    candidate = Guards::default();
                    BeginState::Time
                } else {
                    BeginState::Literal(index + 1)
                };
            }
            BeginState::Time | BeginState::Num | BeginState::Flags => {
                let guards = if in_header { &mut header } else { &mut candidate };
                let slot = match state {
                    BeginState::Time => &mut guards.time,
                    BeginState::Num => &mut guards.num,
                    _ => &mut guards.flags,
                };

                match val {
                    b'0'..=b'9' => {
                        *slot = *slot * 10 + u64::from(val - b'0');
                    }
                    b' ' if !matches!(state, BeginState::Flags) => {
                        let matched = in_header
                            || match state {
                                BeginState::Time => candidate.time == header.time,
                                _ => candidate.num == header.num,
                            };
                        if matched {
                            state = match state {
                                BeginState::Time => BeginState::Num,
                                _ => BeginState::Flags,
                            };
                        } else {
                            state = BeginState::Skip;
                        }
                    }
                    b'\n' if matches!(state, BeginState::Flags) => {
                        if in_header {
                            // Payload starts on the next line.
                            in_header = false;
                            start = pos + 1;
                            state = BeginState::LineStart(0);
                        } else if candidate == header {
                            done = Some(pos + 1);
                            break;
                        } else {
                            // Guard mismatch: the whole candidate line
                            // was payload after all.
                            len = pos + 1 - start;
                            state = BeginState::LineStart(0);
                        }
                    }
                    _ => {
                        if in_header {
                            return Err(Error::parse("malformed %begin guards"));
                        }
                        state = if val == b'\n' {
                            len = pos + 1 - start;
                            BeginState::LineStart(0)
                        } else {
                            BeginState::Skip
                        };
                    }
                }
            }
            BeginState::LineStart(index) => {
                let end_byte = END.get(index);
                let error_byte = ERROR.get(index);
                if Some(&val) == end_byte && Some(&val) == error_byte {
                    state = BeginState::LineStart(index + 1);
                } else if Some(&val) == end_byte {
                    literal = END;
                    is_error = false;
                    state = BeginState::Literal(index + 1);
                } else if Some(&val) == error_byte {
                    literal = ERROR;
                    is_error = true;
                    state = BeginState::Literal(index + 1);
                } else if val == b'\n' {
                    len = pos + 1 - start;
                    state = BeginState::LineStart(0);
                } else {
                    state = BeginState::Skip;
                }
            }
            BeginState::Skip => {
                if val == b'\n' {
                    len = pos + 1 - start;
                    state = BeginState::LineStart(0);
                }
            }
        }
    }

    let Some(consumed) = done else {
        return Ok(None);
    };

    let payload: Vec<u8> = ring
        .iter()
        .skip(start)
        .take(len)
        .filter(|&val| val != 0)
        .collect();
    ring.pop(consumed);
    trim_leading_nuls(ring);
    Ok(Some((payload, is_error)))
}

/// Run one identify-and-consume step against the ring.
pub fn step(ring: &mut Ring) -> Result<Step> {
    match identify(ring) {
        Ident::NeedMore => Ok(Step::NeedMore),
        Ident::NotControl => {
            // Desynchronized stream. Drop the offending line if we have
            // all of it so the next wake can attempt to resynchronize.
            consume_line(ring);
            Err(Error::parse("unexpected non-control output"))
        }
        Ident::Unknown => {
            if let Some(line) = peek_line(ring) {
                warn!("unrecognized control-mode line: {line:?}");
                consume_line(ring);
                Ok(Step::Consumed)
            } else {
                Ok(Step::NeedMore)
            }
        }
        Ident::Known(Command::Begin) => match process_begin(ring)? {
            Some((payload, is_error)) => Ok(Step::Reply { payload, is_error }),
            None => Ok(Step::NeedMore),
        },
        Ident::Known(command) => {
            if consume_line(ring).is_none() {
                return Ok(Step::NeedMore);
            }
            Ok(match command {
                Command::ClientSessionChanged => Step::Refresh(RefreshFlags::CLIENTS),
                Command::LayoutChange
                | Command::PaneModeChanged
                | Command::WindowPaneChanged => Step::Refresh(RefreshFlags::PANES),
                Command::SessionsChanged => Step::Refresh(RefreshFlags::SESSIONS),
                Command::SessionWindowChanged
                | Command::WindowAdd
                | Command::WindowClose
                | Command::UnlinkedWindowAdd
                | Command::UnlinkedWindowClose => Step::Refresh(RefreshFlags::WINDOWS),
                Command::Exit => Step::Exit,
                // %output, renames, and a stray %end carry nothing we
                // track; the reloads pick up any real change.
                _ => Step::Consumed,
            })
        }
    }
}

/// The first buffered line as text, for diagnostics.
fn peek_line(ring: &Ring) -> Option<String> {
    let pos = ring.iter().position(|val| val == b'\n')?;
    let bytes: Vec<u8> = ring.iter().take(pos).filter(|&val| val != 0).collect();
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(chunks: &[&[u8]]) -> Ring {
        // Mimic the read helper: each chunk gets a NUL separator.
        let mut ring = Ring::new();
        for chunk in chunks {
            ring.push(chunk);
            ring.push(&[0]);
        }
        ring
    }

    #[test]
    fn identify_needs_more_on_prefix() {
        let ring = ring_of(&[b"%sessions-chan"]);
        assert_eq!(identify(&ring), Ident::NeedMore);
    }

    #[test]
    fn identify_rejects_plain_output() {
        let ring = ring_of(&[b"hello\n"]);
        assert_eq!(identify(&ring), Ident::NotControl);
    }

    #[test]
    fn notifications_map_to_flags() {
        let mut ring = ring_of(&[b"%sessions-changed\n%layout-change @1 b25d,80x24,0,0,1\n"]);
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::SESSIONS));
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::PANES));
        assert_eq!(step(&mut ring).unwrap(), Step::NeedMore);
        assert!(ring.is_empty());
    }

    #[test]
    fn window_and_client_notifications() {
        let mut ring = ring_of(&[
            b"%window-add @3\n%client-session-changed /dev/pts/1 $2 work\n%window-pane-changed @3 %8\n",
        ]);
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::WINDOWS));
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::CLIENTS));
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::PANES));
    }

    #[test]
    fn output_lines_are_ignored() {
        let mut ring = ring_of(&[b"%output %1 hello world\n%session-renamed $1 dev\n"]);
        assert_eq!(step(&mut ring).unwrap(), Step::Consumed);
        assert_eq!(step(&mut ring).unwrap(), Step::Consumed);
    }

    #[test]
    fn unknown_percent_lines_are_skipped() {
        let mut ring = ring_of(&[b"%paste-buffer-changed buffer0\n%sessions-changed\n"]);
        assert_eq!(step(&mut ring).unwrap(), Step::Consumed);
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::SESSIONS));
    }

    #[test]
    fn plain_reply_round_trips() {
        let mut ring = ring_of(&[b"%begin 123 7 0\n$0 |work\n$3 |dev\n%end 123 7 0\n"]);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, is_error } => {
                assert_eq!(payload, b"$0 |work\n$3 |dev\n");
                assert!(!is_error);
            }
            other => panic!("expected reply, got {other:?}"),
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn error_reply_sets_flag() {
        let mut ring = ring_of(&[b"%begin 5 2 1\nno current session\n%error 5 2 1\n"]);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, is_error } => {
                assert_eq!(payload, b"no current session\n");
                assert!(is_error);
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn empty_reply_has_empty_payload() {
        let mut ring = ring_of(&[b"%begin 9 1 0\n%end 9 1 0\n"]);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, is_error } => {
                assert!(payload.is_empty());
                assert!(!is_error);
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_guards_stay_in_payload() {
        let mut ring = ring_of(&[
            b"%begin 10 4 0\nline one\n%end 10 5 0\nline two\n%end 10 4 0\n",
        ]);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, is_error } => {
                let text = String::from_utf8(payload).unwrap();
                assert!(text.contains("line one"));
                assert!(text.contains("%end 10 5 0"));
                assert!(text.contains("line two"));
                assert!(!is_error);
            }
            other => panic!("expected reply, got {other:?}"),
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn inner_begin_is_payload() {
        let mut ring = ring_of(&[
            b"%begin 20 1 0\n%begin 21 2 0\nnested\n%end 20 1 0\n",
        ]);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, .. } => {
                let text = String::from_utf8(payload).unwrap();
                assert!(text.contains("%begin 21 2 0"));
                assert!(text.contains("nested"));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_envelope_waits() {
        let mut ring = ring_of(&[b"%begin 1 1 0\npartial"]);
        assert_eq!(step(&mut ring).unwrap(), Step::NeedMore);
        // Nothing consumed while incomplete.
        assert!(!ring.is_empty());

        ring.push(b" payload\n%end 1 1 0\n");
        match step(&mut ring).unwrap() {
            Step::Reply { payload, .. } => {
                assert_eq!(payload, b"partial payload\n");
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn chunk_separators_are_invisible() {
        // The same envelope arriving byte-striped across many reads.
        let data = b"%begin 3 3 0\nout\n%end 3 3 0\n";
        let chunks: Vec<&[u8]> = data.chunks(5).collect();
        let mut ring = ring_of(&chunks);
        match step(&mut ring).unwrap() {
            Step::Reply { payload, .. } => assert_eq!(payload, b"out\n"),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn exit_is_reported() {
        let mut ring = ring_of(&[b"%exit\n"]);
        assert_eq!(step(&mut ring).unwrap(), Step::Exit);
    }

    #[test]
    fn non_control_line_errors_but_consumes() {
        let mut ring = ring_of(&[b"garbage line\n%sessions-changed\n"]);
        assert!(step(&mut ring).is_err());
        assert_eq!(step(&mut ring).unwrap(), Step::Refresh(RefreshFlags::SESSIONS));
    }
}
