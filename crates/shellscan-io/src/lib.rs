//! shellscan-io — CSV (`x,y,z`) and ASCII PLY readers/writers.
//!
//! Writers stage output next to the destination and rename it into place once
//! everything is flushed, so a failed run never leaves a truncated file behind.

use anyhow::{bail, Context, Result};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Ply, Property};
use shellscan_core::{Cloud, SampleError};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "x,y,z";

// ---------- CSV ----------

pub fn read_csv(path: &str) -> Result<Cloud> {
    let f = File::open(path).with_context(|| format!("open {}", path))?;
    let cloud = parse_csv(BufReader::new(f)).with_context(|| format!("parse {}", path))?;
    log::debug!("read {} points from {}", cloud.len(), path);
    Ok(cloud)
}

/// One point per line, three comma-separated reals.
/// A first line with no numeric field at all is taken as the header; blank lines are skipped.
pub fn parse_csv<R: BufRead>(reader: R) -> Result<Cloud> {
    let mut c = Cloud::default();
    let mut first = true;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let row = line.trim();
        if row.is_empty() { continue; }
        match parse_row(row) {
            Ok([x, y, z]) => c.push(x, y, z),
            Err(_) if first && is_header(row) => log::debug!("skipping header {:?}", row),
            Err(reason) => return Err(SampleError::MalformedInput { line: n + 1, reason }.into()),
        }
        first = false;
    }
    Ok(c)
}

fn is_header(row: &str) -> bool {
    row.split(',').all(|f| f.trim().parse::<f64>().is_err())
}

fn parse_row(row: &str) -> std::result::Result<[f64; 3], String> {
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    }
    let mut p = [0.0; 3];
    for (v, s) in p.iter_mut().zip(&fields) {
        *v = s.parse::<f64>().map_err(|e| format!("'{}' is not a number ({})", s, e))?;
    }
    Ok(p)
}

pub fn write_csv(path: &str, cloud: &Cloud) -> Result<()> {
    write_staged(path, |w| format_csv(w, cloud))
}

/// Values use the shortest representation that parses back to the same f64.
pub fn format_csv<W: Write>(w: &mut W, cloud: &Cloud) -> Result<()> {
    writeln!(w, "{}", CSV_HEADER)?;
    for [x, y, z] in cloud.iter() {
        writeln!(w, "{:?},{:?},{:?}", x, y, z)?;
    }
    Ok(())
}

// ---------- PLY ----------

pub fn read_ply_ascii(path: &str) -> Result<Cloud> {
    let f = File::open(path).with_context(|| format!("open {}", path))?;
    let mut reader = BufReader::new(f);
    let parser = Parser::<DefaultElement>::new();
    let ply: Ply<DefaultElement> = parser.read_ply(&mut reader)
        .with_context(|| format!("parse {}", path))?;

    // Expect "vertex" element with numeric x,y,z.
    let vertex = ply.payload.get("vertex")
        .ok_or_else(|| anyhow::anyhow!("PLY missing 'vertex' element"))?;

    let mut c = Cloud::with_capacity(vertex.len());
    for el in vertex {
        c.push(get_f64(el, "x")?, get_f64(el, "y")?, get_f64(el, "z")?);
    }
    log::debug!("read {} vertices from {}", c.len(), path);
    Ok(c)
}

fn get_f64(el: &DefaultElement, key: &str) -> Result<f64> {
    match el.get(key) {
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        Some(_) => bail!("property '{}' is not scalar", key),
        None => bail!("missing property '{}'", key),
    }
}

pub fn write_ply_ascii(path: &str, cloud: &Cloud) -> Result<()> {
    write_staged(path, |w| {
        writeln!(w, "ply")?;
        writeln!(w, "format ascii 1.0")?;
        writeln!(w, "element vertex {}", cloud.len())?;
        writeln!(w, "property double x")?;
        writeln!(w, "property double y")?;
        writeln!(w, "property double z")?;
        writeln!(w, "end_header")?;
        for [x, y, z] in cloud.iter() {
            writeln!(w, "{:?} {:?} {:?}", x, y, z)?;
        }
        Ok(())
    })
}

// ---------- dispatch ----------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format { Csv, Ply }

impl Format {
    /// `.ply` means PLY; anything else is treated as CSV.
    pub fn from_path(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".ply") { Format::Ply } else { Format::Csv }
    }
}

pub fn read_auto(path: &str) -> Result<Cloud> {
    match Format::from_path(path) {
        Format::Ply => read_ply_ascii(path),
        Format::Csv => read_csv(path),
    }
}

pub fn write_auto(path: &str, cloud: &Cloud) -> Result<()> {
    match Format::from_path(path) {
        Format::Ply => write_ply_ascii(path, cloud),
        Format::Csv => write_csv(path, cloud),
    }
}

// ---------- staging ----------

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn write_staged<F>(path: &str, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let dest = Path::new(path);
    let tmp = staging_path(dest);
    let result = (|| -> Result<()> {
        let mut w = BufWriter::new(
            File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?,
        );
        body(&mut w)?;
        w.flush()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, dest).with_context(|| format!("move {} into place", path))?;
    Ok(())
}
