//! Component O: binary and text navmesh file formats.
//!
//! Grounded on `original_source`'s `pathfinder/__init__.py`'s
//! `read_from_binary`/`read_from_text` and
//! `pathfinder/navmesh_baker/__init__.py`'s `save_to_binary`/`save_to_text`:
//! big-endian, three flat arrays (vertex floats, polygon indices, polygon
//! sizes) each terminated by a `+inf` sentinel of the array's own element
//! width.
//!
//! The text auto-detection rule (bracketed vs. flat) is this crate's own
//! addition — the Python reader only ever sees the flat layout it wrote
//! itself — covering the "two-line, no brackets" layout other tools in
//! this space emit as an implicit triangle list.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use std::io::{self, Read, Write};

use crate::error::{NavError, Result};

/// Writes `vertices`/`polygons` as the big-endian binary format: vertex
/// floats, then polygon indices, then polygon sizes, each array closed by
/// a `+inf` terminator of its own element width.
pub fn write_binary<W: Write>(writer: &mut W, vertices: &[Vec3], polygons: &[Vec<u32>]) -> Result<()> {
    write_binary_inner(writer, vertices, polygons).map_err(|e| NavError::FileFormatError(e.to_string()))
}

fn write_binary_inner<W: Write>(writer: &mut W, vertices: &[Vec3], polygons: &[Vec<u32>]) -> io::Result<()> {
    for v in vertices {
        writer.write_f32::<BigEndian>(v.x)?;
        writer.write_f32::<BigEndian>(v.y)?;
        writer.write_f32::<BigEndian>(v.z)?;
    }
    writer.write_f32::<BigEndian>(f32::INFINITY)?;

    for polygon in polygons {
        for &index in polygon {
            writer.write_i32::<BigEndian>(index as i32)?;
        }
    }
    writer.write_f32::<BigEndian>(f32::INFINITY)?;

    for polygon in polygons {
        writer.write_i32::<BigEndian>(polygon.len() as i32)?;
    }
    writer.write_f32::<BigEndian>(f32::INFINITY)?;

    Ok(())
}

/// Reads the big-endian binary format back into `(vertices, polygons)`.
/// A stream that runs out of bytes before hitting a terminator surfaces as
/// [`NavError::FileFormatError`].
pub fn read_binary<R: Read>(reader: &mut R) -> Result<(Vec<Vec3>, Vec<Vec<u32>>)> {
    read_binary_inner(reader).map_err(|e| NavError::FileFormatError(e.to_string()))
}

fn read_binary_inner<R: Read>(reader: &mut R) -> io::Result<(Vec<Vec3>, Vec<Vec<u32>>)> {
    let mut coords = Vec::new();
    loop {
        let value = reader.read_f32::<BigEndian>()?;
        if value.is_infinite() {
            break;
        }
        coords.push(value);
    }
    let vertices: Vec<Vec3> = coords.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])).collect();

    let mut flat_indices = Vec::new();
    loop {
        let bits = reader.read_i32::<BigEndian>()?;
        if f32::from_bits(bits as u32).is_infinite() {
            break;
        }
        flat_indices.push(bits as u32);
    }

    let mut sizes = Vec::new();
    loop {
        let bits = reader.read_i32::<BigEndian>()?;
        if f32::from_bits(bits as u32).is_infinite() {
            break;
        }
        sizes.push(bits as usize);
    }

    let mut polygons = Vec::with_capacity(sizes.len());
    let mut cursor = 0usize;
    for size in sizes {
        let end = cursor + size;
        if end > flat_indices.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "polygon size array overruns index array"));
        }
        polygons.push(flat_indices[cursor..end].to_vec());
        cursor = end;
    }

    Ok((vertices, polygons))
}

/// Writes the three-line text format: vertex floats, polygon indices,
/// polygon sizes, each space-separated on its own line.
pub fn write_text<W: Write>(writer: &mut W, vertices: &[Vec3], polygons: &[Vec<u32>]) -> Result<()> {
    let vertex_line = vertices.iter().flat_map(|v| [v.x, v.y, v.z]).map(|f| f.to_string()).collect::<Vec<_>>().join(" ");
    let index_line = polygons.iter().flatten().map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
    let size_line = polygons.iter().map(|p| p.len().to_string()).collect::<Vec<_>>().join(" ");

    writeln!(writer, "{vertex_line}").map_err(|e| NavError::FileFormatError(e.to_string()))?;
    writeln!(writer, "{index_line}").map_err(|e| NavError::FileFormatError(e.to_string()))?;
    write!(writer, "{size_line}").map_err(|e| NavError::FileFormatError(e.to_string()))?;
    Ok(())
}

/// Parses either of two text layouts, picked by the first non-whitespace
/// byte:
///
/// - a leading `[` selects the bracketed, already-segmented variant
///   (`[[x y z] [x y z] ...]` vertices, `[[i i i] [i i] ...]` polygons);
/// - otherwise the input is the flat three-line layout `save_to_text`
///   writes. A non-bracketed two-line input (no size line) is treated as
///   an implicit triangle list: every 3 indices on line 2 form one
///   polygon.
///
/// Any layout this doesn't recognize surfaces as
/// [`NavError::FileFormatError`].
pub fn read_text(text: &str) -> Result<(Vec<Vec3>, Vec<Vec<u32>>)> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        read_bracketed(trimmed)
    } else {
        read_flat(text)
    }
}

fn read_flat(text: &str) -> Result<(Vec<Vec3>, Vec<Vec<u32>>)> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() != 2 && lines.len() != 3 {
        return Err(NavError::FileFormatError(format!("expected 2 or 3 lines in flat text navmesh, found {}", lines.len())));
    }

    let vertex_values: Vec<f32> = parse_numbers(lines[0])?;
    if vertex_values.len() % 3 != 0 {
        return Err(NavError::FileFormatError("vertex line length is not a multiple of 3".into()));
    }
    let vertices: Vec<Vec3> = vertex_values.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])).collect();

    let index_values: Vec<u32> = parse_numbers(lines[1])?.into_iter().map(|v| v as u32).collect();

    let polygons = if lines.len() == 3 {
        let sizes: Vec<usize> = parse_numbers(lines[2])?.into_iter().map(|v| v as usize).collect();
        let mut polygons = Vec::with_capacity(sizes.len());
        let mut cursor = 0usize;
        for size in sizes {
            let end = cursor + size;
            if end > index_values.len() {
                return Err(NavError::FileFormatError("polygon size array overruns index array".into()));
            }
            polygons.push(index_values[cursor..end].to_vec());
            cursor = end;
        }
        polygons
    } else {
        if index_values.len() % 3 != 0 {
            return Err(NavError::FileFormatError("implicit triangle list length is not a multiple of 3".into()));
        }
        index_values.chunks_exact(3).map(|c| c.to_vec()).collect()
    };

    Ok((vertices, polygons))
}

fn parse_numbers(line: &str) -> Result<Vec<f32>> {
    line.split_whitespace().map(|token| token.parse::<f32>().map_err(|e| NavError::FileFormatError(e.to_string()))).collect()
}

/// Parses `[[a b c] [d e f] ...]`-style bracketed groups into flat `f32`
/// rows, used for both the vertex and polygon brackets.
fn read_bracketed(text: &str) -> Result<(Vec<Vec3>, Vec<Vec<u32>>)> {
    let groups = split_bracket_groups(text)?;
    if groups.len() != 2 {
        return Err(NavError::FileFormatError(format!("expected 2 bracketed sections (vertices, polygons), found {}", groups.len())));
    }

    let vertex_rows = split_bracket_groups(&groups[0])?;
    let mut vertices = Vec::with_capacity(vertex_rows.len());
    for row in &vertex_rows {
        let values = parse_numbers(row)?;
        let vertex = match values.len() {
            // 2D coordinates gain an implicit y = 0.
            2 => Vec3::new(values[0], 0.0, values[1]),
            3 => Vec3::new(values[0], values[1], values[2]),
            _ => return Err(NavError::FileFormatError("bracketed vertex row must have 2 or 3 components".into())),
        };
        vertices.push(vertex);
    }

    let polygon_rows = split_bracket_groups(&groups[1])?;
    let mut polygons = Vec::with_capacity(polygon_rows.len());
    for row in &polygon_rows {
        let values = parse_numbers(row)?;
        polygons.push(values.into_iter().map(|v| v as u32).collect());
    }

    Ok((vertices, polygons))
}

/// Splits `[a] [b] [c]` (or the outer `[[a] [b]]`) into its bracket-depth-1
/// contents, stripping the enclosing pair.
fn split_bracket_groups(text: &str) -> Result<Vec<String>> {
    let inner = text.trim();
    let inner = inner.strip_prefix('[').and_then(|s| s.strip_suffix(']')).ok_or_else(|| NavError::FileFormatError("expected a bracketed section".into()))?;

    let mut groups = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '[' => {
                depth += 1;
                if depth > 1 {
                    current.push(ch);
                }
            }
            ']' => {
                depth -= 1;
                if depth == 0 {
                    groups.push(std::mem::take(&mut current));
                } else {
                    current.push(ch);
                }
            }
            _ if depth > 0 => current.push(ch),
            _ => {}
        }
    }
    if depth != 0 {
        return Err(NavError::FileFormatError("unbalanced brackets in text navmesh".into()));
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mesh() -> (Vec<Vec3>, Vec<Vec<u32>>) {
        let vertices = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0)];
        let polygons = vec![vec![0, 1, 2], vec![0, 2, 3]];
        (vertices, polygons)
    }

    #[test]
    fn binary_round_trips() {
        let (vertices, polygons) = sample_mesh();
        let mut buf = Vec::new();
        write_binary(&mut buf, &vertices, &polygons).unwrap();
        let (read_vertices, read_polygons) = read_binary(&mut buf.as_slice()).unwrap();
        assert_eq!(read_vertices.len(), vertices.len());
        assert_eq!(read_polygons, polygons);
    }

    #[test]
    fn flat_text_round_trips() {
        let (vertices, polygons) = sample_mesh();
        let mut buf = Vec::new();
        write_text(&mut buf, &vertices, &polygons).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let (read_vertices, read_polygons) = read_text(&text).unwrap();
        assert_eq!(read_vertices.len(), vertices.len());
        assert_eq!(read_polygons, polygons);
    }

    #[test]
    fn two_line_flat_input_is_implicit_triangle_list() {
        let text = "0 0 0 1 0 0 1 0 1\n0 1 2";
        let (vertices, polygons) = read_text(text).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(polygons, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn bracketed_input_is_detected_by_leading_bracket() {
        let text = "[[0 0 0] [1 0 0] [1 0 1]] [[0 1 2]]";
        let (vertices, polygons) = read_text(text).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(polygons, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn bracketed_2d_vertices_get_an_implicit_y() {
        let text = "[[0 0] [1 0] [1 1]] [[0 1 2]]";
        let (vertices, polygons) = read_text(text).unwrap();
        assert_eq!(vertices, vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0)]);
        assert_eq!(polygons, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn malformed_text_is_a_file_format_error() {
        let err = read_text("not a navmesh").unwrap_err();
        assert!(matches!(err, NavError::FileFormatError(_)));
    }
}
