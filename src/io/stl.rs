//! STL support for closed surfaces exchanged with the boolean engine.
//!
//! Surfaces are written as ASCII. Both ASCII and binary files are read;
//! vertices with identical coordinates are merged so the result is an
//! indexed triangle mesh.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{MeshIoError, PlannerError, Result};
use crate::math::Point3;
use crate::mesh::{Element, TaggedMesh};

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

/// Writes the triangles of `mesh` as an ASCII STL file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_stl(path: &Path, mesh: &TaggedMesh) -> Result<()> {
    let file = File::create(path).map_err(|e| PlannerError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_stl_to(&mut writer, mesh)
        .and_then(|()| writer.flush())
        .map_err(|e| PlannerError::io(path, e))?;
    debug!(path = %path.display(), triangles = mesh.triangles().len(), "wrote surface");
    Ok(())
}

/// Serialises the triangles of `mesh` as ASCII STL.
///
/// # Errors
///
/// Returns any error of the underlying writer.
pub fn write_stl_to<W: Write>(writer: &mut W, mesh: &TaggedMesh) -> std::io::Result<()> {
    let nodes = mesh.nodes();
    writeln!(writer, "solid surface")?;
    for tri in mesh.triangles() {
        let [a, b, c, _] = tri.nodes;
        let (v0, v1, v2) = (nodes[a], nodes[b], nodes[c]);
        let normal = (v1 - v0).cross(&(v2 - v0));
        let len = normal.norm();
        let n = if len > f64::EPSILON { normal / len } else { normal * 0.0 };

        writeln!(writer, "  facet normal {:e} {:e} {:e}", n.x, n.y, n.z)?;
        writeln!(writer, "    outer loop")?;
        for v in [v0, v1, v2] {
            writeln!(writer, "      vertex {:e} {:e} {:e}", v.x, v.y, v.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid surface")
}

/// Reads an ASCII or binary STL file into a triangle mesh tagged `tag`.
///
/// # Errors
///
/// Returns [`MeshIoError::FileNotFound`] for a missing file and
/// [`MeshIoError::InvalidContent`] for malformed content.
pub fn read_stl(path: &Path, tag: i32) -> Result<TaggedMesh> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MeshIoError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            MeshIoError::Io(e)
        }
    })?;
    parse_stl(&bytes, tag)
}

/// Parses STL bytes, detecting the format.
///
/// A file is binary when its size matches the face count in the header,
/// even if the header starts with `solid`.
///
/// # Errors
///
/// See [`read_stl`].
pub fn parse_stl(bytes: &[u8], tag: i32) -> Result<TaggedMesh> {
    if is_binary(bytes) {
        return parse_binary(bytes, tag);
    }
    let text = String::from_utf8_lossy(bytes);
    if !text.trim_start().starts_with("solid") {
        return Err(MeshIoError::invalid(1, "not an STL file").into());
    }
    parse_ascii(&text.replace('\r', ""), tag)
}

fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + 4 {
        return false;
    }
    let count = u32::from_le_bytes([
        bytes[HEADER_SIZE],
        bytes[HEADER_SIZE + 1],
        bytes[HEADER_SIZE + 2],
        bytes[HEADER_SIZE + 3],
    ]);
    usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(TRIANGLE_SIZE))
        .and_then(|body| body.checked_add(HEADER_SIZE + 4))
        == Some(bytes.len())
}

/// Collects triangle corners, merging bit-identical vertices.
#[derive(Default)]
struct Welder {
    nodes: Vec<Point3>,
    index: HashMap<[u64; 3], usize>,
    triangles: Vec<[usize; 3]>,
}

impl Welder {
    fn vertex(&mut self, p: Point3) -> usize {
        let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
        *self.index.entry(key).or_insert_with(|| {
            self.nodes.push(p);
            self.nodes.len() - 1
        })
    }

    fn push(&mut self, corners: [Point3; 3]) {
        let tri = corners.map(|p| self.vertex(p));
        self.triangles.push(tri);
    }

    fn finish(self, tag: i32) -> Result<TaggedMesh> {
        let elements = self
            .triangles
            .into_iter()
            .map(|t| Element::triangle(t, tag, tag))
            .collect();
        TaggedMesh::new(self.nodes, elements)
    }
}

fn parse_binary(bytes: &[u8], tag: i32) -> Result<TaggedMesh> {
    let mut welder = Welder::default();
    for chunk in bytes[HEADER_SIZE + 4..].chunks_exact(TRIANGLE_SIZE) {
        // Skip the 12-byte normal.
        welder.push([
            read_vertex(&chunk[12..24]),
            read_vertex(&chunk[24..36]),
            read_vertex(&chunk[36..48]),
        ]);
    }
    welder.finish(tag)
}

fn read_vertex(buf: &[u8]) -> Point3 {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Point3::new(f64::from(x), f64::from(y), f64::from(z))
}

fn parse_ascii(text: &str, tag: i32) -> Result<TaggedMesh> {
    let mut welder = Welder::default();
    let mut corners: Vec<Point3> = Vec::with_capacity(3);

    for (i, line) in text.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            continue;
        };
        match keyword.to_lowercase().as_str() {
            "outer" => corners.clear(),
            "vertex" => {
                if parts.len() < 4 {
                    return Err(MeshIoError::invalid(i + 1, "vertex needs 3 coordinates").into());
                }
                let mut c = [0.0; 3];
                for (slot, field) in c.iter_mut().zip(&parts[1..4]) {
                    *slot = field
                        .parse()
                        .map_err(|e| MeshIoError::invalid(i + 1, format!("`{field}`: {e}")))?;
                }
                corners.push(Point3::new(c[0], c[1], c[2]));
            }
            "endfacet" => {
                let [a, b, c] = corners.as_slice() else {
                    return Err(MeshIoError::invalid(
                        i + 1,
                        format!("facet with {} vertices", corners.len()),
                    )
                    .into());
                };
                welder.push([*a, *b, *c]);
            }
            "endsolid" => break,
            _ => {}
        }
    }
    welder.finish(tag)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mesh::tests::two_tets;

    fn surface() -> TaggedMesh {
        two_tets(5, 7).outer_surface(1004)
    }

    #[test]
    fn ascii_round_trip_welds_vertices() {
        let mesh = surface();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface.stl");
        write_stl(&path, &mesh).unwrap();

        let back = read_stl(&path, 1004).unwrap();
        assert_eq!(back.node_count(), mesh.node_count());
        assert_eq!(back.element_count(), mesh.element_count());
        for (a, b) in back.triangles().iter().zip(mesh.triangles()) {
            for k in 0..3 {
                assert_eq!(back.nodes()[a.nodes[k]], mesh.nodes()[b.nodes[k]]);
            }
        }
    }

    #[test]
    fn reads_binary() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[..5].copy_from_slice(b"solid");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        let tris: [[f32; 9]; 2] = [
            [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        ];
        for t in tris {
            bytes.extend_from_slice(&[0u8; 12]);
            for c in t {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&0u16.to_le_bytes());
        }

        let mesh = parse_stl(&bytes, 1506).unwrap();
        assert_eq!(mesh.node_count(), 4);
        assert_eq!(mesh.element_count(), 2);
        assert_eq!(mesh.triangles()[1].nodes[..3], [1, 3, 2]);
        assert!(mesh.elements().iter().all(|e| e.tag1 == 1506 && e.tag2 == 1506));
    }

    #[test]
    fn rejects_garbage_and_broken_facets() {
        assert!(parse_stl(b"hello", 1).is_err());
        let broken = "solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid x\n";
        assert!(matches!(
            parse_stl(broken.as_bytes(), 1).unwrap_err(),
            PlannerError::MeshIo(MeshIoError::InvalidContent { line: 7, .. })
        ));
    }
}
