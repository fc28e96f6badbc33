//! Bulk loading of observation set files
//!
//! Each set header opens a pending set. Observations are validated against
//! the set's declared conditions as they are read and written in batches of
//! `batch_size`, one immediate transaction per batch. The set row goes in
//! with the first batch. Batches already committed stay committed if a later
//! line fails.

use std::collections::HashMap;
use std::io::BufRead;

use rusqlite::TransactionBehavior;
use serde::Serialize;

use super::observation_store::{
    declared_condition_id, warn_on_advisory_mismatch, write_observation_row, write_set_row,
    ObservationStore,
};
use super::schema;
use crate::error::{PtoError, Result, ResultExt, ValidationError};
use crate::model::{Observation, ObservationSet};
use crate::osf::{self, Record};

/// Outcome of [`ObservationStore::ingest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Ids of the sets created, in file order
    pub sets: Vec<i64>,
    /// Observations written
    pub observations: u64,
    /// Transactions committed
    pub batches: u64,
}

#[derive(Debug)]
struct PendingSet {
    set: ObservationSet,
    batch: Vec<Observation>,
}

impl ObservationStore {
    /// Load every set and observation from an observation set file.
    pub fn ingest<R: BufRead>(&mut self, reader: R) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut pending: Option<PendingSet> = None;

        for record in osf::records(reader) {
            let (line, record) = record?;
            match record {
                Record::Set(mut set) => {
                    if let Some(mut done) = pending.take() {
                        self.finish(&mut done, &mut report)?;
                    }
                    self.cache
                        .resolve_all_in_set(&self.conn, &mut set)
                        .with_context(|| format!("line {}", line))?;
                    pending = Some(PendingSet {
                        set,
                        batch: Vec::new(),
                    });
                }
                Record::Observation(mut obs) => {
                    let Some(current) = pending.as_mut() else {
                        return Err(PtoError::from(ValidationError::OrphanObservation)
                            .context(format!("line {}", line)));
                    };
                    let condition_id = declared_condition_id(&mut current.set, &obs)
                        .with_context(|| format!("line {}", line))?;
                    obs.condition.id = Some(condition_id);
                    warn_on_advisory_mismatch(&obs, &current.set);
                    current.batch.push(obs);

                    if current.batch.len() >= self.batch_size {
                        self.flush(current, &mut report)?;
                    }
                }
            }
        }

        if let Some(mut done) = pending.take() {
            self.finish(&mut done, &mut report)?;
        }

        tracing::info!(
            "Ingested {} observations into {} sets ({} transactions)",
            report.observations,
            report.sets.len(),
            report.batches
        );
        Ok(report)
    }

    /// Write whatever is left of a set, creating its row even if it had no
    /// observations.
    fn finish(&mut self, pending: &mut PendingSet, report: &mut IngestReport) -> Result<()> {
        if !pending.batch.is_empty() || pending.set.id.is_none() {
            self.flush(pending, report)?;
        }
        Ok(())
    }

    fn flush(&mut self, pending: &mut PendingSet, report: &mut IngestReport) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (set_id, created) = match pending.set.id {
            Some(id) => (id, false),
            None => (write_set_row(&tx, &pending.set)?, true),
        };

        // Paths repeat heavily within a batch
        let mut paths: HashMap<String, i64> = HashMap::new();
        for obs in pending.batch.iter_mut() {
            match paths.get(&obs.path.string) {
                Some(&id) => obs.path.id = Some(id),
                None => {
                    let id = schema::insert_once(&tx, &mut obs.path)?;
                    paths.insert(obs.path.string.clone(), id);
                }
            }
            write_observation_row(&tx, set_id, obs)?;
        }
        tx.commit()?;

        if created {
            pending.set.id = Some(set_id);
            report.sets.push(set_id);
        }
        let written = pending.batch.len() as u64;
        report.observations += written;
        report.batches += 1;
        pending.batch.clear();

        tracing::debug!("Set {}: committed {} observations", set_id, written);
        Ok(())
    }
}
