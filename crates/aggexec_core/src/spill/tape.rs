//! Logical tape pool abstraction (spec.md §6 `tape_pool` contract).
//!
//! A "tape" is one append-only byte stream, rewindable for a single
//! sequential read pass. [`FileTapePool`] backs each tape with an
//! anonymous temp file (`tempfile::tempfile`) so nothing needs manual
//! cleanup on drop or on error unwind.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use aggexec_error::{AggExecError, ErrorKind, Result};

/// Handle to a set of tapes created together; recursive spill batches get
/// their own set (spec.md §9 open question: shared vs per-batch tape
/// pools are both permitted — this crate chooses per-episode sets, see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapeSetId(pub u64);

pub trait TapePool: std::fmt::Debug {
    fn create(&mut self, n_tapes: usize) -> Result<TapeSetId>;
    fn extend(&mut self, set: TapeSetId, n_extra: usize) -> Result<()>;
    fn write(&mut self, set: TapeSetId, tape: usize, bytes: &[u8]) -> Result<()>;
    fn rewind_for_read(&mut self, set: TapeSetId, tape: usize) -> Result<()>;
    /// Reads up to `n` bytes. Returns `Ok(None)` at end of stream, matching
    /// a short read of zero bytes; any other short read is an `IOError`.
    fn read(&mut self, set: TapeSetId, tape: usize, n: usize) -> Result<Option<Vec<u8>>>;
    fn close(&mut self, set: TapeSetId) -> Result<()>;
}

#[derive(Debug)]
struct TapeSet {
    tapes: Vec<File>,
}

/// Default [`TapePool`] backed by real temp files.
#[derive(Debug, Default)]
pub struct FileTapePool {
    sets: HashMap<TapeSetId, TapeSet>,
    next_id: u64,
}

impl FileTapePool {
    pub fn new() -> Self {
        FileTapePool::default()
    }

    fn set_mut(&mut self, set: TapeSetId) -> Result<&mut TapeSet> {
        self.sets
            .get_mut(&set)
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "unknown tape set"))
    }
}

impl TapePool for FileTapePool {
    fn create(&mut self, n_tapes: usize) -> Result<TapeSetId> {
        let mut tapes = Vec::with_capacity(n_tapes);
        for _ in 0..n_tapes {
            let file = tempfile::tempfile().map_err(AggExecError::from)?;
            tapes.push(file);
        }
        let id = TapeSetId(self.next_id);
        self.next_id += 1;
        self.sets.insert(id, TapeSet { tapes });
        Ok(id)
    }

    fn extend(&mut self, set: TapeSetId, n_extra: usize) -> Result<()> {
        let set = self.set_mut(set)?;
        for _ in 0..n_extra {
            let file = tempfile::tempfile().map_err(AggExecError::from)?;
            set.tapes.push(file);
        }
        Ok(())
    }

    fn write(&mut self, set: TapeSetId, tape: usize, bytes: &[u8]) -> Result<()> {
        let set = self.set_mut(set)?;
        let file = set
            .tapes
            .get_mut(tape)
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "unknown tape index"))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| AggExecError::with_kind(ErrorKind::Io, e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| AggExecError::with_kind(ErrorKind::Io, e.to_string()))?;
        Ok(())
    }

    fn rewind_for_read(&mut self, set: TapeSetId, tape: usize) -> Result<()> {
        let set = self.set_mut(set)?;
        let file = set
            .tapes
            .get_mut(tape)
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "unknown tape index"))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| AggExecError::with_kind(ErrorKind::Io, e.to_string()))?;
        Ok(())
    }

    fn read(&mut self, set: TapeSetId, tape: usize, n: usize) -> Result<Option<Vec<u8>>> {
        let set = self.set_mut(set)?;
        let file = set
            .tapes
            .get_mut(tape)
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "unknown tape index"))?;
        let mut buf = vec![0u8; n];
        let mut read_total = 0;
        while read_total < n {
            let read = file
                .read(&mut buf[read_total..])
                .map_err(|e| AggExecError::with_kind(ErrorKind::Io, e.to_string()))?;
            if read == 0 {
                break;
            }
            read_total += read;
        }
        if read_total == 0 {
            return Ok(None);
        }
        if read_total != n {
            return Err(AggExecError::with_kind(
                ErrorKind::Io,
                format!("short read on spill tape: wanted {n}, got {read_total}"),
            ));
        }
        Ok(Some(buf))
    }

    fn close(&mut self, set: TapeSetId) -> Result<()> {
        self.sets.remove(&set);
        Ok(())
    }
}
