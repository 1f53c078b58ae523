//! PCD (Point Cloud Data) I/O
//!
//! PCD is the native format for Point Cloud Library (PCL). Only the `x y z`
//! fields are decoded; any other fields (normals, rgb, intensity, ...) are
//! skipped over.

use crate::{Error, Result};
use cv_core::point_cloud::PointCloud;
use nalgebra::Point3;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// PCD data format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdData {
    Ascii,
    Binary,
    BinaryCompressed,
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    size: usize,
    kind: char,
    count: usize,
}

/// Parsed PCD header.
#[derive(Debug, Clone)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<String>,
    pub width: usize,
    pub height: usize,
    pub points: usize,
    pub data: PcdData,
    specs: Vec<FieldSpec>,
}

impl PcdHeader {
    /// Bytes per point record in binary data.
    fn point_stride(&self) -> Result<usize> {
        let stride = self
            .specs
            .iter()
            .try_fold(0usize, |acc, f| f.size.checked_mul(f.count).and_then(|b| acc.checked_add(b)))
            .ok_or_else(|| Error::Parse("PCD point record size overflows".to_string()))?;
        if stride == 0 {
            return Err(Error::Parse("PCD point record has zero size".to_string()));
        }
        Ok(stride)
    }

    fn byte_offset(&self, field: usize) -> usize {
        self.specs[..field].iter().map(|f| f.size * f.count).sum()
    }

    fn column(&self, field: usize) -> usize {
        self.specs[..field].iter().map(|f| f.count).sum()
    }

    fn field_index(&self, name: &str) -> Result<usize> {
        self.specs
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::Parse(format!("PCD file has no '{}' field", name)))
    }

    /// Indices of the `x`, `y` and `z` fields, each holding at least one value.
    fn xyz_fields(&self) -> Result<[usize; 3]> {
        let fields = [self.field_index("x")?, self.field_index("y")?, self.field_index("z")?];
        for &f in &fields {
            let spec = &self.specs[f];
            if spec.count == 0 || spec.size == 0 {
                return Err(Error::Parse(format!("PCD field '{}' holds no data", spec.name)));
            }
        }
        Ok(fields)
    }
}

/// Load a PCD file from disk.
pub fn read_pcd_file<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })?;
    let cloud = read_pcd(BufReader::new(file))?;
    tracing::debug!(path = %path.display(), points = cloud.len(), "loaded PCD file");
    Ok(cloud)
}

/// Read a PCD stream.
pub fn read_pcd<R: BufRead>(mut reader: R) -> Result<PointCloud> {
    let header = read_header(&mut reader)?;

    let points = match header.data {
        PcdData::Ascii => parse_ascii(reader, &header)?,
        PcdData::Binary => parse_binary(reader, &header)?,
        PcdData::BinaryCompressed => {
            return Err(Error::UnsupportedFormat(
                "binary_compressed PCD data is not supported".to_string(),
            ))
        }
    };

    if header.width.checked_mul(header.height) == Some(points.len()) && header.height > 1 {
        PointCloud::organized(points, header.width, header.height)
    } else {
        Ok(PointCloud::new(points))
    }
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
    let mut version = String::from("0.7");
    let mut fields: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = 0;
    let mut height = 1;
    let mut points_count = None;

    let mut line = String::new();
    let data = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Parse("Unexpected EOF in PCD header".to_string()));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let values = &parts[1..];
        match parts[0] {
            "VERSION" => {
                version = values.first().unwrap_or(&"0.7").to_string();
            }
            "FIELDS" | "COLUMNS" => {
                fields = values.iter().map(|s| s.to_string()).collect();
            }
            "SIZE" => {
                sizes = parse_list(values, "SIZE")?;
            }
            "TYPE" => {
                types = values.iter().filter_map(|s| s.chars().next()).collect();
            }
            "COUNT" => {
                counts = parse_list(values, "COUNT")?;
            }
            "WIDTH" => {
                width = parse_scalar(values, "WIDTH")?;
            }
            "HEIGHT" => {
                height = parse_scalar(values, "HEIGHT")?;
            }
            "POINTS" => {
                points_count = Some(parse_scalar(values, "POINTS")?);
            }
            "VIEWPOINT" => {}
            "DATA" => {
                break match values.first().copied() {
                    Some("ascii") => PcdData::Ascii,
                    Some("binary") => PcdData::Binary,
                    Some("binary_compressed") => PcdData::BinaryCompressed,
                    other => {
                        return Err(Error::Parse(format!("Unknown PCD DATA type {:?}", other)))
                    }
                };
            }
            other => {
                return Err(Error::Parse(format!("Unknown PCD header entry '{}'", other)));
            }
        }
    };

    if fields.is_empty() {
        return Err(Error::Parse("PCD header has no FIELDS".to_string()));
    }
    if counts.is_empty() {
        counts = vec![1; fields.len()];
    }
    if sizes.is_empty() {
        sizes = vec![4; fields.len()];
    }
    if types.is_empty() {
        types = vec!['F'; fields.len()];
    }
    if sizes.len() != fields.len() || types.len() != fields.len() || counts.len() != fields.len() {
        return Err(Error::Parse(format!(
            "PCD header field lists disagree: {} fields, {} sizes, {} types, {} counts",
            fields.len(),
            sizes.len(),
            types.len(),
            counts.len()
        )));
    }

    let specs = fields
        .iter()
        .zip(&sizes)
        .zip(&types)
        .zip(&counts)
        .map(|(((name, &size), &kind), &count)| FieldSpec {
            name: name.clone(),
            size,
            kind,
            count,
        })
        .collect();

    let points = match points_count {
        Some(points) => points,
        None => width
            .checked_mul(height)
            .ok_or_else(|| Error::Parse(format!("PCD size {}x{} overflows", width, height)))?,
    };

    Ok(PcdHeader {
        version,
        fields,
        width,
        height,
        points,
        data,
        specs,
    })
}

fn parse_list(values: &[&str], key: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|_| Error::Parse(format!("Invalid {} value '{}'", key, s)))
        })
        .collect()
}

fn parse_scalar(values: &[&str], key: &str) -> Result<usize> {
    let raw = values
        .first()
        .ok_or_else(|| Error::Parse(format!("Missing {} value", key)))?;
    raw.parse()
        .map_err(|_| Error::Parse(format!("Invalid {} value '{}'", key, raw)))
}

fn parse_ascii<R: BufRead>(reader: R, header: &PcdHeader) -> Result<Vec<Point3<f32>>> {
    let cols = header.xyz_fields()?.map(|f| header.column(f));

    // POINTS is untrusted, so the buffer grows with the rows actually read
    let mut points = Vec::new();
    for line in reader.lines() {
        if points.len() >= header.points {
            break;
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut xyz = [0.0f32; 3];
        for (slot, &col) in xyz.iter_mut().zip(&cols) {
            let token = tokens.get(col).ok_or_else(|| {
                Error::Parse(format!("PCD row {} is too short: '{}'", points.len(), line))
            })?;
            *slot = token.parse().map_err(|_| {
                Error::Parse(format!("Invalid coordinate '{}' in row {}", token, points.len()))
            })?;
        }
        points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
    }

    if points.len() != header.points {
        return Err(Error::Parse(format!(
            "PCD declares {} points but contains {}",
            header.points,
            points.len()
        )));
    }
    Ok(points)
}

fn parse_binary<R: Read>(reader: R, header: &PcdHeader) -> Result<Vec<Point3<f32>>> {
    let stride = header.point_stride()?;
    let fields = header.xyz_fields()?;
    let offsets = fields.map(|f| header.byte_offset(f));
    let specs = fields.map(|f| &header.specs[f]);

    let expected = stride
        .checked_mul(header.points)
        .ok_or_else(|| Error::Parse(format!("PCD declares too many points ({})", header.points)))?;

    // Read no more than the header promises, allocating only what arrives
    let mut buffer = Vec::new();
    reader.take(expected as u64).read_to_end(&mut buffer)?;
    if buffer.len() != expected {
        return Err(Error::Parse(format!(
            "PCD binary payload truncated (expected {} bytes, got {})",
            expected,
            buffer.len()
        )));
    }

    let mut points = Vec::with_capacity(header.points);
    for row in buffer.chunks_exact(stride) {
        let mut xyz = [0.0f32; 3];
        for axis in 0..3 {
            xyz[axis] = decode_scalar(&row[offsets[axis]..], specs[axis])?;
        }
        points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
    }
    Ok(points)
}

fn decode_scalar(bytes: &[u8], spec: &FieldSpec) -> Result<f32> {
    let value = match (spec.kind, spec.size) {
        ('F', 4) => f32::from_le_bytes(field_bytes(bytes, spec)?),
        ('F', 8) => f64::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('I', 1) => i8::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('U', 1) => u8::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('I', 2) => i16::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('U', 2) => u16::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('I', 4) => i32::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        ('U', 4) => u32::from_le_bytes(field_bytes(bytes, spec)?) as f32,
        (kind, size) => {
            return Err(Error::UnsupportedFormat(format!(
                "PCD field '{}' has unsupported type {}{}",
                spec.name, kind, size
            )))
        }
    };
    Ok(value)
}

fn field_bytes<const N: usize>(bytes: &[u8], spec: &FieldSpec) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Parse(format!("Field '{}' overruns point record", spec.name)))
}
