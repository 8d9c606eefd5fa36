//! Incremental parser for RFC822-style control files (Packages, Sources).
//!
//! The state machine is [`ParserState::step`]: it consumes the current state and one line
//! and returns the next state, plus any record that the line flushed. [`RecordStream`]
//! drives it over a lazy line stream, so the index is never held in memory as a whole.
//!
//! Recognised line forms, tested in this order:
//! 1. `KEY: VALUE` assigns a scalar (a repeated key concatenates)
//! 2. `KEY:` opens a list field
//! 3. ` VALUE` continues the most recently named field
//! 4. an empty line is a record boundary (only under [`BoundaryStrategy::BlankLineDelimited`])
//!
//! Anything else is a fatal [`ParseError::Malformed`].

use std::io;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::ParseError;
use crate::record::{FieldValue, Record, PACKAGE};

/// How the parser decides where one record ends and the next begins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum BoundaryStrategy {
    /// Records are separated by empty lines (Sources indices).
    #[serde(rename = "blank_line")]
    BlankLineDelimited,
    /// A record ends when its identifying key appears again (Packages indices).
    #[serde(rename = "key_recurrence")]
    KeyRecurrenceDelimited {
        #[serde(default = "default_identity_key")]
        key: String,
    },
}

fn default_identity_key() -> String {
    PACKAGE.to_string()
}

impl BoundaryStrategy {
    /// Key recurrence on the `Package` field.
    pub fn key_recurrence() -> Self {
        BoundaryStrategy::KeyRecurrenceDelimited {
            key: default_identity_key(),
        }
    }
}

/// A record leaving the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flushed {
    /// Carries its identifying fields; goes downstream.
    Complete(Record),
    /// Missing identifying fields; logged and dropped.
    Incomplete(Record),
}

impl Flushed {
    fn classify(record: Record) -> Self {
        if record.identity().is_some() {
            Flushed::Complete(record)
        } else {
            Flushed::Incomplete(record)
        }
    }
}

/// The result of feeding one line to a [`ParserState`].
#[derive(Debug)]
pub struct Transition {
    pub state: ParserState,
    pub flushed: Option<Flushed>,
}

/// The parser accumulator: the in-progress record and the last named field.
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    record: Record,
    last_field: Option<String>,
    line_number: u64,
}

fn key_line() -> &'static Regex {
    static KEY_LINE: OnceLock<Regex> = OnceLock::new();
    KEY_LINE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9_.+-]*):(.*)$").expect("key line pattern is valid")
    })
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record accumulated so far.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The field a continuation line would extend.
    pub fn last_field(&self) -> Option<&str> {
        self.last_field.as_deref()
    }

    /// Number of lines fed so far.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Feeds one line (without terminator) and returns the next state.
    ///
    /// A scalar grows by plain concatenation, whether from a repeated key or a
    /// continuation line.
    pub fn step(
        mut self,
        line: &str,
        strategy: &BoundaryStrategy,
    ) -> Result<Transition, ParseError> {
        self.line_number += 1;

        if let Some(caps) = key_line().captures(line) {
            let key = &caps[1];
            let value = caps[2].trim_start_matches([' ', '\t']);

            let mut flushed = None;
            if let BoundaryStrategy::KeyRecurrenceDelimited { key: identity } = strategy {
                if key == identity && self.record.contains(identity) {
                    flushed = Some(self.take());
                }
            }

            if value.is_empty() {
                self.open_list(key);
            } else {
                self.assign_scalar(key, value);
            }
            self.last_field = Some(key.to_owned());
            return Ok(Transition {
                state: self,
                flushed,
            });
        }

        if let Some(rest) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            let Some(field) = self.last_field.as_deref() else {
                return Err(ParseError::OrphanContinuation {
                    line_number: self.line_number,
                    line: line.to_owned(),
                });
            };
            match self.record.get_mut(field) {
                Some(FieldValue::List(items)) => items.push(rest.to_owned()),
                Some(FieldValue::Scalar(value)) => value.push_str(rest),
                None => {
                    return Err(ParseError::OrphanContinuation {
                        line_number: self.line_number,
                        line: line.to_owned(),
                    })
                }
            }
            return Ok(Transition {
                state: self,
                flushed: None,
            });
        }

        if line.is_empty() {
            let flushed = match strategy {
                BoundaryStrategy::BlankLineDelimited if !self.record.is_empty() => {
                    Some(self.take())
                }
                _ => {
                    self.last_field = None;
                    None
                }
            };
            return Ok(Transition {
                state: self,
                flushed,
            });
        }

        Err(ParseError::Malformed {
            line_number: self.line_number,
            line: line.to_owned(),
        })
    }

    /// End of input: whatever is still accumulated is flushed once.
    pub fn finish(mut self) -> Option<Flushed> {
        if self.record.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> Flushed {
        self.last_field = None;
        Flushed::classify(std::mem::take(&mut self.record))
    }

    fn open_list(&mut self, key: &str) {
        if !self.record.contains(key) {
            self.record.insert(key, FieldValue::List(Vec::new()));
        }
    }

    fn assign_scalar(&mut self, key: &str, value: &str) {
        match self.record.get_mut(key) {
            Some(FieldValue::Scalar(existing)) => existing.push_str(value),
            Some(FieldValue::List(items)) => items.push(value.to_owned()),
            None => self.record.insert(key, FieldValue::Scalar(value.to_owned())),
        }
    }
}

/// Counters kept by a [`RecordStream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: u64,
    pub records_emitted: u64,
    pub records_dropped: u64,
}

/// Lazily turns a stream of lines into a stream of complete records.
///
/// Incomplete records are logged at `warn` and skipped. The stream ends after the first
/// error.
pub struct RecordStream<L> {
    lines: L,
    strategy: BoundaryStrategy,
    state: ParserState,
    stats: ParseStats,
    done: bool,
}

impl<L> RecordStream<L>
where
    L: Stream<Item = io::Result<String>> + Unpin,
{
    pub fn new(lines: L, strategy: BoundaryStrategy) -> Self {
        Self {
            lines,
            strategy,
            state: ParserState::new(),
            stats: ParseStats::default(),
            done: false,
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    fn accept(&mut self, flushed: Option<Flushed>) -> Option<Record> {
        match flushed? {
            Flushed::Complete(record) => {
                self.stats.records_emitted += 1;
                debug!(record = %record.label(), "[PARSE] Record complete");
                Some(record)
            }
            Flushed::Incomplete(record) => {
                self.stats.records_dropped += 1;
                let fields = serde_json::to_string(&record).unwrap_or_default();
                warn!(
                    record = %record.label(),
                    line = self.stats.lines_read,
                    %fields,
                    "[PARSE] Incomplete record dropped"
                );
                None
            }
        }
    }
}

impl<L> Stream for RecordStream<L>
where
    L: Stream<Item = io::Result<String>> + Unpin,
{
    type Item = Result<Record, ParseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(this.lines.poll_next_unpin(cx)) {
                Some(Ok(line)) => {
                    this.stats.lines_read += 1;
                    let state = std::mem::take(&mut this.state);
                    match state.step(&line, &this.strategy) {
                        Ok(Transition { state, flushed }) => {
                            this.state = state;
                            if let Some(record) = this.accept(flushed) {
                                return Poll::Ready(Some(Ok(record)));
                            }
                        }
                        Err(e) => {
                            this.done = true;
                            error!(error = %e, "[PARSE] Unrecognised line, aborting parse");
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Some(Err(source)) => {
                    this.done = true;
                    let e = ParseError::Io {
                        line_number: this.stats.lines_read,
                        source,
                    };
                    error!(error = %e, "[PARSE] Index stream failed");
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    let flushed = std::mem::take(&mut this.state).finish();
                    if let Some(record) = this.accept(flushed) {
                        return Poll::Ready(Some(Ok(record)));
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}
