//! Branch-light byte-level state machine that finds record and field
//! boundaries in a CSV buffer (§4.1).
//!
//! The scanner is a pure function over a byte slice and a starting state:
//! scanning `A || B` from state `s` yields the same events as scanning `A`
//! from `s` then `B` from whatever state scanning `A` ended in. That
//! property is what lets [`crate::chunk::ChunkPlanner`] split a file on
//! arbitrary byte offsets and still resume parsing correctly per chunk.

use memchr::memchr3_iter;

/// Resumable state of the scanner between calls. `field_start` tracks
/// whether the next byte begins a fresh field, since a quote only opens a
/// quoted region when it is the first byte of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    pub(crate) mode: Mode,
    pub(crate) field_start: bool,
}

impl ScanState {
    pub const START: ScanState = ScanState {
        mode: Mode::Unquoted,
        field_start: true,
    };

    /// True if scanning ended (or would end, at EOF) inside an open quoted
    /// region — i.e. an unterminated quoted field.
    pub fn in_quotes(&self) -> bool {
        matches!(self.mode, Mode::Quoted | Mode::QuotedSeenQuote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unquoted,
    Quoted,
    /// Just saw a quote while inside a quoted field; the next byte decides
    /// whether it was an escaped quote or the end of the field.
    QuotedSeenQuote,
}

/// The five byte-classification events from §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// `pos` is the offset of the delimiter byte itself.
    FieldEnd { pos: usize },
    /// `pos` is the offset of the first terminator byte; `len` is 1 for
    /// LF/CR, 2 for CRLF.
    RecordEnd { pos: usize, len: usize },
    /// A quote opened a quoted field at `pos`.
    QuoteEnter { pos: usize },
    /// A quote closed a quoted field; `pos` is the separator byte that
    /// follows it (the closing quote itself may be in a prior chunk).
    QuoteExit { pos: usize },
    /// The data byte at `pos`; accumulated into the current field. An
    /// escaped quote (`""`) surfaces as a single `Data` event at the
    /// position of the second quote, with `escaped: true`.
    Data { pos: usize, escaped: bool },
}

/// Immutable scanning parameters, shared read-only across worker threads.
#[derive(Debug, Clone, Copy)]
pub struct ScanDialect {
    pub delimiter: u8,
    pub quote: u8,
}

/// Scans `buf` starting in `state`, calling `on_event` for each classified
/// byte or byte-pair, and returns the state the scanner ended in.
///
/// This single code path is both the "serial" and the "SIMD" path
/// described in §4.1/§9: `memchr`/`memchr3_iter` skip runs of bytes that
/// cannot change state, and the small amount of actual transition logic
/// that remains is scalar. There is no separate fallback implementation to
/// keep in sync, so the two parse modes are bit-identical by construction
/// (property test 2, §8).
pub fn scan(
    buf: &[u8],
    mut state: ScanState,
    dialect: ScanDialect,
    mut on_event: impl FnMut(ScanEvent),
) -> ScanState {
    let ScanDialect { delimiter, quote } = dialect;
    let mut cursor = 0usize;
    let len = buf.len();

    while cursor < len {
        match state.mode {
            Mode::Unquoted => {
                if state.field_start && buf[cursor] == quote {
                    on_event(ScanEvent::QuoteEnter { pos: cursor });
                    state.mode = Mode::Quoted;
                    state.field_start = false;
                    cursor += 1;
                    continue;
                }

                let next_special = memchr3_iter(delimiter, b'\r', b'\n', &buf[cursor..])
                    .next()
                    .map(|pos| cursor + pos)
                    .unwrap_or(len);
                for pos in cursor..next_special {
                    on_event(ScanEvent::Data {
                        pos,
                        escaped: false,
                    });
                }
                cursor = next_special;
                state.field_start = false;
                if cursor >= len {
                    break;
                }
                cursor = emit_separator(buf, cursor, delimiter, &mut state, &mut on_event);
            }
            Mode::Quoted => {
                let next_quote = memchr::memchr(quote, &buf[cursor..])
                    .map(|pos| cursor + pos)
                    .unwrap_or(len);
                for pos in cursor..next_quote {
                    on_event(ScanEvent::Data {
                        pos,
                        escaped: false,
                    });
                }
                cursor = next_quote;
                if cursor >= len {
                    break;
                }
                state.mode = Mode::QuotedSeenQuote;
                cursor += 1;
            }
            Mode::QuotedSeenQuote => {
                let b = buf[cursor];
                if b == quote {
                    on_event(ScanEvent::Data {
                        pos: cursor,
                        escaped: true,
                    });
                    state.mode = Mode::Quoted;
                    cursor += 1;
                } else if b == delimiter || b == b'\n' || b == b'\r' {
                    on_event(ScanEvent::QuoteExit { pos: cursor });
                    state.mode = Mode::Unquoted;
                    state.field_start = false;
                    cursor = emit_separator(buf, cursor, delimiter, &mut state, &mut on_event);
                } else {
                    // Stray character after a closing quote: lenient mode,
                    // treat as data and resume the quoted region.
                    on_event(ScanEvent::Data {
                        pos: cursor,
                        escaped: false,
                    });
                    state.mode = Mode::Quoted;
                    cursor += 1;
                }
            }
        }
    }

    state
}

/// Emits the FieldEnd/RecordEnd event for the separator byte at `cursor`
/// (which must be `delimiter`, `\r`, or `\n`) and returns the cursor
/// position after it. Sets `field_start` on the resulting state.
fn emit_separator(
    buf: &[u8],
    cursor: usize,
    delimiter: u8,
    state: &mut ScanState,
    on_event: &mut impl FnMut(ScanEvent),
) -> usize {
    let len = buf.len();
    let b = buf[cursor];
    if b == delimiter {
        on_event(ScanEvent::FieldEnd { pos: cursor });
        state.field_start = true;
        cursor + 1
    } else if b == b'\n' {
        on_event(ScanEvent::RecordEnd { pos: cursor, len: 1 });
        state.field_start = true;
        cursor + 1
    } else {
        debug_assert_eq!(b, b'\r');
        if cursor + 1 < len && buf[cursor + 1] == b'\n' {
            on_event(ScanEvent::RecordEnd { pos: cursor, len: 2 });
            state.field_start = true;
            cursor + 2
        } else {
            on_event(ScanEvent::RecordEnd { pos: cursor, len: 1 });
            state.field_start = true;
            cursor + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(buf: &[u8], dialect: ScanDialect) -> Vec<ScanEvent> {
        let mut out = Vec::new();
        scan(buf, ScanState::START, dialect, |e| out.push(e));
        out
    }

    fn d() -> ScanDialect {
        ScanDialect {
            delimiter: b',',
            quote: b'"',
        }
    }

    #[test]
    fn simple_record() {
        let evs = events(b"a,b\n", d());
        assert!(evs
            .iter()
            .any(|e| matches!(e, ScanEvent::FieldEnd { pos: 1 })));
        assert!(evs
            .iter()
            .any(|e| matches!(e, ScanEvent::RecordEnd { pos: 3, len: 1 })));
    }

    #[test]
    fn crlf_is_one_event() {
        let evs = events(b"a,b\r\n", d());
        let record_ends: Vec<_> = evs
            .iter()
            .filter(|e| matches!(e, ScanEvent::RecordEnd { .. }))
            .collect();
        assert_eq!(record_ends.len(), 1);
        assert_eq!(record_ends[0], &ScanEvent::RecordEnd { pos: 3, len: 2 });
    }

    #[test]
    fn resumability_matches_single_call() {
        let input = b"aaaa,bbbb\ncccc,dddd\n\"q,x\"\"y\",z\n";
        let whole = events(input, d());

        for split in 0..input.len() {
            let mut out = Vec::new();
            let state = scan(&input[..split], ScanState::START, d(), |e| out.push(e));
            scan(&input[split..], state, d(), |e| {
                out.push(offset_event(e, split))
            });
            assert_eq!(out, whole, "mismatch splitting at {split}");
        }
    }

    fn offset_event(e: ScanEvent, by: usize) -> ScanEvent {
        match e {
            ScanEvent::FieldEnd { pos } => ScanEvent::FieldEnd { pos: pos + by },
            ScanEvent::RecordEnd { pos, len } => ScanEvent::RecordEnd { pos: pos + by, len },
            ScanEvent::QuoteEnter { pos } => ScanEvent::QuoteEnter { pos: pos + by },
            ScanEvent::QuoteExit { pos } => ScanEvent::QuoteExit { pos: pos + by },
            ScanEvent::Data { pos, escaped } => ScanEvent::Data {
                pos: pos + by,
                escaped,
            },
        }
    }

    #[test]
    fn quoted_field_with_escape() {
        let evs = events(b"\"a\"\"b\",c\n", d());
        assert!(evs.iter().any(|e| matches!(e, ScanEvent::QuoteEnter { .. })));
        assert!(evs.iter().any(|e| matches!(e, ScanEvent::QuoteExit { .. })));
        assert!(evs
            .iter()
            .any(|e| matches!(e, ScanEvent::Data { escaped: true, .. })));
    }

    #[test]
    fn unterminated_quote_reported_by_state() {
        let mut out = Vec::new();
        let end = scan(b"\"abc", ScanState::START, d(), |e| out.push(e));
        assert!(end.in_quotes());
    }
}
