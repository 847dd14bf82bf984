//! Lazy typed rows over raw CSV text.
//!
//! Every record has one trailing separator removed before the CSV reader sees
//! it. A row is kept only if every schema column present in the header parses.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Read};

use csv::StringRecord;
use tracing::warn;

use stocksync_infra::InventoryFields;

use crate::columns::{CellValue, ColumnParser};
use crate::schema::Schema;

const SEPARATOR: u8 = b',';
const QUOTE: u8 = b'"';

/// One parsed row, keyed by header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.values.get(header)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every field as the string stored in the cache.
    pub fn to_fields(&self) -> InventoryFields {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_field_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub read: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Strips one trailing separator from each record as it streams through.
///
/// A line that ends inside a quoted field is not the end of a record, so it is
/// passed through untouched.
struct TrimTrailingSeparator<R> {
    inner: R,
    line: Vec<u8>,
    pos: usize,
    in_quotes: bool,
}

impl<R: BufRead> Read for TrimTrailingSeparator<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.line.len() {
            self.line.clear();
            self.pos = 0;
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(0);
            }
            let mut end = self.line.len();
            if self.line[..end].ends_with(b"\n") {
                end -= 1;
            }
            if self.line[..end].ends_with(b"\r") {
                end -= 1;
            }
            // An escaped quote toggles twice, leaving the state unchanged.
            let quotes = self.line[..end].iter().filter(|&&b| b == QUOTE).count();
            if quotes % 2 == 1 {
                self.in_quotes = !self.in_quotes;
            }
            if !self.in_quotes && end > 0 && self.line[end - 1] == SEPARATOR {
                self.line.remove(end - 1);
            }
        }
        let n = buf.len().min(self.line.len() - self.pos);
        buf[..n].copy_from_slice(&self.line[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Single-pass iterator of typed rows. Not restartable.
pub struct CsvRows<'a> {
    records: csv::StringRecordsIntoIter<TrimTrailingSeparator<&'a [u8]>>,
    /// Per header position: schema column name and parser, if known.
    columns: Vec<Option<(String, ColumnParser)>>,
    schema: &'a str,
    stats: RowStats,
}

impl<'a> CsvRows<'a> {
    pub fn new(text: &'a str, schema: &Schema) -> Self {
        let source = TrimTrailingSeparator {
            inner: text.as_bytes(),
            line: Vec::new(),
            pos: 0,
            in_quotes: false,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(SEPARATOR)
            .from_reader(source);

        let columns = match reader.headers() {
            Ok(headers) => headers
                .iter()
                .map(|h| {
                    let h = h.trim().trim_start_matches('\u{feff}');
                    schema.column(h).map(|c| (c.name.clone(), c.parser))
                })
                .collect(),
            Err(e) => {
                warn!(schema = schema.name(), error = %e, "unreadable csv header");
                Vec::new()
            }
        };

        Self {
            records: reader.into_records(),
            columns,
            schema: schema.name(),
            stats: RowStats::default(),
        }
    }

    pub fn stats(&self) -> RowStats {
        self.stats
    }

    fn parse(&self, record: &StringRecord) -> Result<Row, String> {
        let mut values = BTreeMap::new();
        for (index, column) in self.columns.iter().enumerate() {
            let Some((name, parser)) = column else { continue };
            let raw = record.get(index).unwrap_or("");
            let value = parser(raw).map_err(|e| format!("{name}: {e}"))?;
            values.insert(name.clone(), value);
        }
        Ok(Row { values })
    }
}

impl Iterator for CsvRows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.columns.is_empty() {
            return None;
        }
        loop {
            let record = self.records.next()?;
            self.stats.read += 1;
            let line = record.as_ref().ok().and_then(|r| r.position()).map(|p| p.line());

            let parsed = match &record {
                Ok(record) if record.iter().all(|f| f.trim().is_empty()) => {
                    // Blank line; not a data row.
                    self.stats.read -= 1;
                    continue;
                }
                Ok(record) => self.parse(record).map_err(|e| (e, raw_line(record))),
                Err(e) => Err((e.to_string(), String::new())),
            };

            match parsed {
                Ok(row) => {
                    self.stats.accepted += 1;
                    return Some(row);
                }
                Err((error, raw)) => {
                    self.stats.rejected += 1;
                    warn!(schema = self.schema, line, raw = %raw, error = %error, "row rejected");
                }
            }
        }
    }
}

fn raw_line(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}
