//! Window layout string parser.
//!
//! tmux reports each window's pane arrangement as a checksum followed by
//! a recursive grammar: `WxH,X,Y,<pane-id>` for a leaf, `WxH,X,Y{…}` /
//! `WxH,X,Y[…]` for horizontal/vertical containers with comma-separated
//! children, e.g. `b25d,89x24,0,0{44x24,0,0,1,44x24,45,0,2}`.
//!
//! We only need the leaves: every pane's `(id, x, y, w, h)`. A five-state
//! scanner walks the tokens; a `[` or `{` closing the y field signals a
//! container, which contributes nothing itself and just resets the state.

use std::ops::ControlFlow;

use crate::error::{Error, Result};
use crate::model::PaneId;

/// A leaf pane's geometry within its window, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneGeometry {
    pub id: PaneId,
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

/// Split `input` at every delimiter byte, remembering which delimiter
/// closed each token. Empty tokens (adjacent delimiters) are skipped.
///
/// The last token is reported with a NUL delimiter.
fn tokens(input: &str) -> impl Iterator<Item = (&str, char)> {
    const DELIMS: &[char] = &[',', 'x', '[', ']', '{', '}'];

    let mut rest = input;
    std::iter::from_fn(move || {
        loop {
            if rest.is_empty() {
                return None;
            }
            match rest.find(DELIMS) {
                Some(0) => rest = &rest[1..],
                Some(at) => {
                    let token = &rest[..at];
                    let delim = rest[at..].chars().next().unwrap_or('\0');
                    rest = &rest[at + 1..];
                    return Some((token, delim));
                }
                None => {
                    let token = rest;
                    rest = "";
                    return Some((token, '\0'));
                }
            }
        }
    })
}

fn field(token: &str) -> Result<u16> {
    token
        .parse()
        .map_err(|_| Error::parse(format!("bad layout field {token:?}")))
}

/// Walk a layout string, invoking `emit` for every leaf pane.
///
/// The callback may stop the walk early with `ControlFlow::Break`.
pub fn parse<F>(layout: &str, mut emit: F) -> Result<()>
where
    F: FnMut(PaneGeometry) -> ControlFlow<()>,
{
    let mut iter = tokens(layout.trim());

    // The leading token is the layout checksum.
    match iter.next() {
        Some((_, ',')) => {}
        _ => return Err(Error::parse(format!("layout missing checksum: {layout:?}"))),
    }

    #[derive(Clone, Copy)]
    enum State {
        Width,
        Height,
        X,
        Y,
        Id,
    }

    let mut state = State::Width;
    let (mut w, mut h, mut x, mut y) = (0u16, 0u16, 0u16, 0u16);
    for (token, delim) in iter {
        match state {
            State::Width => {
                if delim != 'x' {
                    return Err(Error::parse(format!("layout {layout:?}: want WxH")));
                }
                w = field(token)?;
                state = State::Height;
            }
            State::Height => {
                if delim != ',' {
                    return Err(Error::parse(format!("layout {layout:?}: after height")));
                }
                h = field(token)?;
                state = State::X;
            }
            State::X => {
                if delim != ',' {
                    return Err(Error::parse(format!("layout {layout:?}: after x")));
                }
                x = field(token)?;
                state = State::Y;
            }
            State::Y => {
                // A container opener (or closer) here means this cell
                // described a split, not a pane; start over inside it.
                if delim != ',' {
                    let _ = field(token)?;
                    state = State::Width;
                    continue;
                }
                y = field(token)?;
                state = State::Id;
            }
            State::Id => {
                if matches!(delim, 'x' | '[' | '{') {
                    return Err(Error::parse(format!("layout {layout:?}: after id")));
                }
                let id: i64 = token
                    .parse()
                    .map_err(|_| Error::parse(format!("bad pane id {token:?}")))?;
                let id = PaneId(id);
                if emit(PaneGeometry { id, x, y, w, h }).is_break() {
                    return Ok(());
                }
                state = State::Width;
            }
        }
    }

    Ok(())
}

/// Collect every leaf pane of a layout string.
pub fn parse_all(layout: &str) -> Result<Vec<PaneGeometry>> {
    let mut panes = Vec::new();
    parse(layout, |pane| {
        panes.push(pane);
        ControlFlow::Continue(())
    })?;
    Ok(panes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(id: i64, x: u16, y: u16, w: u16, h: u16) -> PaneGeometry {
        PaneGeometry {
            id: PaneId(id),
            x,
            y,
            w,
            h,
        }
    }

    #[test]
    fn single_pane() {
        let panes = parse_all("b25d,89x24,0,0,1").unwrap();
        assert_eq!(panes, vec![geo(1, 0, 0, 89, 24)]);
    }

    #[test]
    fn side_by_side_split() {
        let panes = parse_all("f865,89x24,0,0{44x24,0,0,1,44x24,45,0,2}").unwrap();
        assert_eq!(panes, vec![geo(1, 0, 0, 44, 24), geo(2, 45, 0, 44, 24)]);
    }

    #[test]
    fn stacked_split() {
        let panes = parse_all("dead,80x24,0,0[80x12,0,0,1,80x11,0,13,2]").unwrap();
        assert_eq!(panes, vec![geo(1, 0, 0, 80, 12), geo(2, 0, 13, 80, 11)]);
    }

    #[test]
    fn nested_containers() {
        let panes =
            parse_all("c0de,89x24,0,0{44x24,0,0[44x12,0,0,1,44x11,0,13,2],44x24,45,0,3}").unwrap();
        assert_eq!(
            panes,
            vec![
                geo(1, 0, 0, 44, 12),
                geo(2, 0, 13, 44, 11),
                geo(3, 45, 0, 44, 24),
            ]
        );
    }

    #[test]
    fn early_stop() {
        let mut seen = Vec::new();
        parse("f865,89x24,0,0{44x24,0,0,1,44x24,45,0,2}", |pane| {
            seen.push(pane.id);
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen, vec![PaneId(1)]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_all("").is_err());
        // No checksum: the first token must be closed by a comma.
        assert!(parse_all("89x24,0,0,1").is_err());
        assert!(parse_all("b25d,89y24,0,0,1").is_err());
        assert!(parse_all("b25d,89x24,zz,0,1").is_err());
    }
}
