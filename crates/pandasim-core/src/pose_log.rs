//! Bounded pose history
//!
//! A fixed-capacity ring buffer of end-effector/object pose samples. Once
//! full, each new entry overwrites the oldest one. Storage is allocated up
//! front and never grows past the capacity.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::math::Pose;
use crate::{Error, Result};

/// One sampled snapshot of the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseLogEntry {
    /// Sequence number since session start (not reset with the log)
    pub seq: u64,
    /// Seconds since the log origin
    pub t: f64,
    /// End-effector pose
    pub ee: Pose,
    /// Object pose, absent when no object is spawned
    pub object: Option<Pose>,
}

/// Fixed-capacity, oldest-first pose history
#[derive(Debug, Clone)]
pub struct PoseLog {
    slots: Vec<PoseLogEntry>,
    /// Index of the oldest entry once the buffer has wrapped
    head: usize,
    capacity: usize,
    origin: Instant,
    next_seq: u64,
    evicted: u64,
}

impl PoseLog {
    /// Create an empty log; a zero capacity is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
            origin: Instant::now(),
            next_seq: 0,
            evicted: 0,
        }
    }

    /// Seconds since the log origin
    pub fn elapsed(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Append a sample stamped with the current time
    pub fn record(&mut self, ee: Pose, object: Option<Pose>) -> &PoseLogEntry {
        let mut t = self.elapsed();
        if let Some(last) = self.latest() {
            t = t.max(last.t);
        }
        let entry = PoseLogEntry {
            seq: self.next_seq,
            t,
            ee,
            object,
        };
        self.next_seq += 1;

        let index = if self.slots.len() < self.capacity {
            self.slots.push(entry);
            self.slots.len() - 1
        } else {
            let index = self.head;
            self.slots[index] = entry;
            self.head = (self.head + 1) % self.capacity;
            self.evicted += 1;
            index
        };
        &self.slots[index]
    }

    /// Drop every entry and move the time origin to now
    pub fn restart(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.evicted = 0;
        self.origin = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries overwritten since the last restart
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PoseLogEntry> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Oldest retained entry
    pub fn oldest(&self) -> Option<&PoseLogEntry> {
        self.slots.get(self.head).or_else(|| self.slots.first())
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&PoseLogEntry> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity || self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }

    /// Owned copy of the entries, oldest first
    pub fn entries(&self) -> Vec<PoseLogEntry> {
        self.iter().cloned().collect()
    }

    /// Serialize as `{"log": [...]}`
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Dump<'a> {
            log: Vec<&'a PoseLogEntry>,
        }
        serde_json::to_string(&Dump {
            log: self.iter().collect(),
        })
        .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Write the JSON dump to a file, creating parent directories
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let io = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let mut writer = BufWriter::new(File::create(path).map_err(io)?);
        writer.write_all(json.as_bytes()).map_err(io)?;
        writer.flush().map_err(io)?;
        tracing::debug!(path = %path.display(), entries = self.len(), "wrote pose log");
        Ok(())
    }
}
