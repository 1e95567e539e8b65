use std::io::{self, Write};

use crate::error::TraceError;
use crate::export::report::{HopReport, Reporter};
use crate::state::{HopRecord, TraceRecord, TraceSession, TraceStatus};

/// Export a finished trace as pretty JSON
pub fn export_json<W: Write>(record: &TraceRecord, mut writer: W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, record)?;
    writeln!(writer)?;
    writer.flush()
}

/// Collects the trace and writes it as one JSON document when it ends
pub struct JsonReporter<W: Write> {
    writer: W,
    record: Option<TraceRecord>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            record: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn start(&mut self, session: &TraceSession) -> io::Result<()> {
        self.record = Some(TraceRecord::new(session));
        Ok(())
    }

    fn hop(&mut self, report: &HopReport) -> io::Result<()> {
        if let Some(record) = self.record.as_mut() {
            record.hops.push(HopRecord {
                outcome: report.outcome.clone(),
                hostname: report.name.as_resolved().map(str::to_string),
            });
        }
        Ok(())
    }

    fn finish(&mut self, status: TraceStatus) -> io::Result<()> {
        let Some(record) = self.record.as_mut() else {
            return Ok(());
        };
        record.status = Some(status);
        export_json(record, &mut self.writer)
    }

    /// Emit what was collected, with the error; a bare error object if nothing started
    fn fatal(&mut self, error: &TraceError) -> io::Result<()> {
        match self.record.as_mut() {
            Some(record) => {
                record.error = Some(error.to_string());
                export_json(record, &mut self.writer)
            }
            None => {
                let value = serde_json::json!({ "error": error.to_string() });
                serde_json::to_writer_pretty(&mut self.writer, &value)?;
                writeln!(self.writer)?;
                self.writer.flush()
            }
        }
    }
}
