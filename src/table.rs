use anyhow::{Context, Result, bail};
use std::collections::{HashMap, HashSet};
use std::io::Write;

pub type Row = Vec<Option<String>>;

// `None` cells: the source row was shorter than the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordSet {
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let raw_headers = reader.headers().context("failed to read CSV header row")?;
        if raw_headers.is_empty() {
            bail!("no columns to parse: header row is missing");
        }
        let headers = normalize_headers(raw_headers.iter());
        let width = headers.len();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("malformed CSV record {}", idx + 1))?;
            if record.len() > width {
                let line = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 2);
                bail!(
                    "line {line}: expected at most {width} fields, saw {}",
                    record.len()
                );
            }

            let mut row: Row = record.iter().map(|cell| Some(cell.to_string())).collect();
            row.resize(width, None);
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Blank names become `Unnamed: <index>` and repeats get a numeric suffix
/// (`id`, `id.1`, `id.2`).
fn normalize_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (idx, name) in names.enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 0usize;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}.{suffix}");
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Row>,
}

impl MergedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Option<&str>>> + '_ {
        self.rows.iter().map(|row| {
            (0..self.headers.len())
                .map(|i| row.get(i).and_then(|cell| cell.as_deref()))
                .collect()
        })
    }

    pub fn append(&mut self, set: RecordSet) {
        let mapping: Vec<usize> = set
            .headers
            .iter()
            .map(|name| self.position_of(name))
            .collect();

        for row in set.rows {
            let mut aligned: Row = vec![None; self.headers.len()];
            for (cell, &column) in row.into_iter().zip(&mapping) {
                aligned[column] = cell;
            }
            self.rows.push(aligned);
        }
    }

    fn position_of(&mut self, name: &str) -> usize {
        if let Some(&pos) = self.positions.get(name) {
            return pos;
        }
        let pos = self.headers.len();
        self.headers.push(name.to_string());
        self.positions.insert(name.to_string(), pos);
        pos
    }

    pub fn write_csv<W: Write>(&self, writer: W, missing_value: &str) -> Result<()> {
        if self.headers.is_empty() {
            return Ok(());
        }

        let mut out = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        out.write_record(&self.headers)
            .context("failed to write merged header")?;
        for row in self.rows() {
            out.write_record(row.into_iter().map(|cell| cell.unwrap_or(missing_value)))
                .context("failed to write merged row")?;
        }
        out.flush().context("failed to flush merged output")?;
        Ok(())
    }
}
