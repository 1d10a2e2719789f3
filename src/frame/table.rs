// SignalCrab - GPL-3.0-or-later
// This file is part of SignalCrab.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// SignalCrab is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SignalCrab is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with SignalCrab.  If not, see <https://www.gnu.org/licenses/>.

//! Untyped tabular data as read from and written to CSV.

use crate::error::{PipelineError, Result};
use std::io::{Read, Write};
use std::path::Path;

/// A rectangular table of text cells with a header row.
///
/// This is the boundary type between the pipeline and whatever supplies or
/// consumes the data. Cells are kept verbatim so untouched columns round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table, checking that every row has one cell per header
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(PipelineError::Schema(format!(
                "row {} has {} cells, expected {}",
                idx + 1,
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Iterate over the cells of one column
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[index].as_str())
    }

    /// Read a CSV document with a header row
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(PipelineError::Schema("input has no header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::new(headers, rows)
    }

    pub fn read_csv_path(path: &Path) -> Result<Self> {
        tracing::info!("Loading table from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::read_csv(std::io::BufReader::new(file))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))?;
        tracing::info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let input = "Time, a ,b\n2004-01-01 00:00,1.5,x\n2004-01-01 01:00,,y\n";
        let table = RawTable::read_csv(input.as_bytes()).expect("valid csv");

        assert_eq!(table.headers(), ["Time", "a", "b"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_index("a"), Some(1));
        assert_eq!(table.column(1).collect::<Vec<_>>(), ["1.5", ""]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = RawTable::new(
            vec!["Time".to_string(), "a".to_string()],
            vec![vec!["2004-01-01".to_string()]],
        )
        .expect_err("ragged row");
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_write_preserves_cells() {
        let input = "Time,a\n2004-01-01 00:00,1.50\n2004-01-01 01:00,\"2,5\"\n";
        let table = RawTable::read_csv(input.as_bytes()).expect("valid csv");

        let mut out = Vec::new();
        table.write_csv(&mut out).expect("write succeeds");
        assert_eq!(String::from_utf8(out).expect("utf8"), input);
    }
}
