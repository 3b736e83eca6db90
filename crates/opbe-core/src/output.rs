// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Output Sinks
// ─────────────────────────────────────────────────────────────────────

use std::io::Write;

use opbe_types::{OpbeError, OpbeResult, OutputRecord};

/// Receives one record per scheduled output time.
pub trait OutputSink {
    fn write(&mut self, record: &OutputRecord) -> OpbeResult<()>;

    fn flush(&mut self) -> OpbeResult<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<OutputRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OutputRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, record: &OutputRecord) -> OpbeResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for JsonLinesSink<W> {
    fn write(&mut self, record: &OutputRecord) -> OpbeResult<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| OpbeError::Output(format!("record at t={}: {e}", record.time)))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| OpbeError::Output(format!("record at t={}: {e}", record.time)))?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OpbeResult<()> {
        self.writer
            .flush()
            .map_err(|e| OpbeError::Output(format!("flush: {e}")))
    }
}
