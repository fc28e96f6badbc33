//! Observation Set Files
//!
//! Newline-delimited text mixing two kinds of line:
//!
//! ```text
//! {"_sources":["agentA"],"_analyzer":"pto-basic","_conditions":["icmp.unreachable"]}
//! ["0","2020-01-01T00:00:00Z","2020-01-01T00:05:00Z","1.2.3.0/24","icmp.unreachable"]
//! ["0","2020-01-01T00:05:00Z","2020-01-01T00:10:00Z","1.2.4.0/24","icmp.unreachable"]
//! ```
//!
//! An object line opens a set; the array lines after it belong to that set
//! until the next object line. Blank lines are skipped. Errors name the
//! 1-based line they occurred on.

use std::io::{BufRead, Lines, Write};

use crate::codec::observation::observation_from_value;
use crate::codec::parse_json;
use crate::codec::set::set_from_value;
use crate::error::{PtoError, Result, ValidationError};
use crate::model::{Observation, ObservationSet};

/// One non-blank line of an observation set file
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Set header (metadata object)
    Set(ObservationSet),
    /// Observation array
    Observation(Observation),
}

/// A set header together with the observations that followed it
#[derive(Debug, Clone, PartialEq)]
pub struct SetGroup {
    /// The decoded header
    pub set: ObservationSet,
    /// Observations in file order
    pub observations: Vec<Observation>,
}

/// Classify and decode a single line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> std::result::Result<Option<Record>, ValidationError> {
    let trimmed = line.trim();
    match trimmed.chars().next() {
        None => Ok(None),
        Some('{') => Ok(Some(Record::Set(set_from_value(parse_json(trimmed.as_bytes())?)?))),
        Some('[') => Ok(Some(Record::Observation(observation_from_value(parse_json(
            trimmed.as_bytes(),
        )?)?))),
        Some(_) => Err(ValidationError::UnexpectedLine(
            trimmed.chars().take(40).collect(),
        )),
    }
}

/// Iterator over the records of a file, with line numbers
#[derive(Debug)]
pub struct Records<R> {
    lines: Lines<R>,
    line: usize,
}

/// Stream the records of an observation set file
pub fn records<R: BufRead>(reader: R) -> Records<R> {
    Records {
        lines: reader.lines(),
        line: 0,
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<(usize, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(PtoError::from(e).context(format!("line {}", self.line + 1)))),
            };
            self.line += 1;
            match parse_line(&text) {
                Ok(None) => continue,
                Ok(Some(record)) => return Some(Ok((self.line, record))),
                Err(e) => return Some(Err(PtoError::from(e).context(format!("line {}", self.line)))),
            }
        }
    }
}

/// Read a stream of observation lines only
pub fn read_observations<R: BufRead>(reader: R) -> Result<Vec<Observation>> {
    let mut out = Vec::new();
    for record in records(reader) {
        match record? {
            (_, Record::Observation(obs)) => out.push(obs),
            (line, Record::Set(_)) => {
                return Err(PtoError::from(ValidationError::UnexpectedLine(
                    "observation set header in observation stream".into(),
                ))
                .context(format!("line {}", line)))
            }
        }
    }
    Ok(out)
}

/// Read a complete observation set file into per-set groups
pub fn read_set_file<R: BufRead>(reader: R) -> Result<Vec<SetGroup>> {
    let mut groups: Vec<SetGroup> = Vec::new();
    for record in records(reader) {
        match record? {
            (_, Record::Set(set)) => groups.push(SetGroup {
                set,
                observations: Vec::new(),
            }),
            (line, Record::Observation(obs)) => match groups.last_mut() {
                Some(group) => group.observations.push(obs),
                None => {
                    return Err(PtoError::from(ValidationError::OrphanObservation)
                        .context(format!("line {}", line)))
                }
            },
        }
    }
    Ok(groups)
}

/// Write observations, one JSON array per line
pub fn write_observations<W: Write>(observations: &[Observation], out: &mut W) -> Result<()> {
    for obs in observations {
        serde_json::to_writer(&mut *out, obs)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Write a set header followed by its observations
pub fn write_set_file<W: Write>(
    set: &ObservationSet,
    observations: &[Observation],
    out: &mut W,
) -> Result<()> {
    serde_json::to_writer(&mut *out, set)?;
    out.write_all(b"\n")?;
    write_observations(observations, out)
}
