//! Gmsh MSH 2.2 ASCII support.
//!
//! ```text
//! $MeshFormat
//! 2.2 0 8
//! $EndMeshFormat
//! $Nodes
//! N
//! id x y z
//! $EndNodes
//! $Elements
//! M
//! id type ntags tag... node...
//! $EndElements
//! ```
//!
//! Node ids are 1-based in the file and 0-based in [`TaggedMesh`]. The first
//! element tag is read as `tag1` and the second as `tag2`; a single tag is
//! used for both. Only triangles (type 2) and tetrahedra (type 4) are kept,
//! other element types and unknown sections are skipped.
//!
//! Coordinates are written with the shortest representation that reads back
//! to the same `f64`, so aligned nodes stay bit-identical across files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{MeshIoError, PlannerError, Result};
use crate::math::Point3;
use crate::mesh::{Element, ElementKind, TaggedMesh};

/// Strips carriage returns left by tools writing CRLF line endings.
#[must_use]
pub fn sanitize_line_endings(text: &str) -> String {
    text.replace('\r', "")
}

/// Reads a mesh from an MSH 2.2 ASCII file.
///
/// # Errors
///
/// Returns [`MeshIoError::FileNotFound`] for a missing file,
/// [`MeshIoError::Unsupported`] for binary or non-2.x files and
/// [`MeshIoError::InvalidContent`] for malformed content.
pub fn read_msh(path: &Path) -> Result<TaggedMesh> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MeshIoError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            MeshIoError::Io(e)
        }
    })?;
    let text = sanitize_line_endings(&String::from_utf8_lossy(&bytes));
    let mesh = parse_msh(&text)?;
    debug!(
        path = %path.display(),
        nodes = mesh.node_count(),
        elements = mesh.element_count(),
        "read mesh"
    );
    Ok(mesh)
}

/// Parses MSH 2.2 ASCII text (already free of carriage returns).
///
/// # Errors
///
/// See [`read_msh`].
pub fn parse_msh(text: &str) -> Result<TaggedMesh> {
    let mut lines = Lines::new(text);
    let mut seen_format = false;
    let mut nodes = Vec::new();
    let mut ids: HashMap<u64, usize> = HashMap::new();
    let mut elements = Vec::new();

    while let Some((line_no, line)) = lines.next_nonblank() {
        match line {
            "$MeshFormat" => {
                parse_format(&mut lines)?;
                lines.expect("$EndMeshFormat")?;
                seen_format = true;
            }
            "$Nodes" => {
                parse_nodes(&mut lines, &mut nodes, &mut ids)?;
                lines.expect("$EndNodes")?;
            }
            "$Elements" => {
                parse_elements(&mut lines, &ids, &mut elements)?;
                lines.expect("$EndElements")?;
            }
            section if section.starts_with('$') => {
                let end = format!("$End{}", &section[1..]);
                lines.skip_to(&end)?;
            }
            other => {
                return Err(MeshIoError::invalid(line_no, format!("unexpected `{other}`")).into());
            }
        }
    }

    if !seen_format {
        return Err(MeshIoError::Unsupported("missing $MeshFormat section".to_owned()).into());
    }
    TaggedMesh::new(nodes, elements)
}

fn parse_format(lines: &mut Lines<'_>) -> Result<()> {
    let (line_no, line) = lines.next_required()?;
    let mut fields = line.split_whitespace();
    let version = fields.next().unwrap_or_default();
    let file_type = fields.next().unwrap_or_default();
    if !version.starts_with("2.") && version != "2" {
        return Err(MeshIoError::Unsupported(format!("MSH version {version}")).into());
    }
    match file_type {
        "0" => Ok(()),
        "1" => Err(MeshIoError::Unsupported("binary MSH".to_owned()).into()),
        _ => Err(MeshIoError::invalid(line_no, format!("bad format line `{line}`")).into()),
    }
}

fn parse_nodes(lines: &mut Lines<'_>, nodes: &mut Vec<Point3>, ids: &mut HashMap<u64, usize>) -> Result<()> {
    let count = lines.next_count()?;
    nodes.reserve(count);
    for _ in 0..count {
        let (line_no, line) = lines.next_required()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(MeshIoError::invalid(line_no, "node line needs an id and 3 coordinates").into());
        }
        let id: u64 = parse_field(fields[0], line_no)?;
        let p = Point3::new(
            parse_field(fields[1], line_no)?,
            parse_field(fields[2], line_no)?,
            parse_field(fields[3], line_no)?,
        );
        if ids.insert(id, nodes.len()).is_some() {
            return Err(MeshIoError::invalid(line_no, format!("duplicate node id {id}")).into());
        }
        nodes.push(p);
    }
    Ok(())
}

fn parse_elements(lines: &mut Lines<'_>, ids: &HashMap<u64, usize>, elements: &mut Vec<Element>) -> Result<()> {
    let count = lines.next_count()?;
    let mut skipped = 0usize;
    for _ in 0..count {
        let (line_no, line) = lines.next_required()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(MeshIoError::invalid(line_no, "element line too short").into());
        }
        let ty: u32 = parse_field(fields[1], line_no)?;
        let Some(kind) = ElementKind::from_gmsh_type(ty) else {
            skipped += 1;
            continue;
        };
        let ntags: usize = parse_field(fields[2], line_no)?;
        let tags = fields.get(3..3 + ntags).ok_or_else(|| MeshIoError::invalid(line_no, "missing element tags"))?;
        let node_fields = &fields[3 + ntags..];
        if node_fields.len() != kind.node_count() {
            return Err(MeshIoError::invalid(
                line_no,
                format!("expected {} nodes, got {}", kind.node_count(), node_fields.len()),
            )
            .into());
        }

        let (tag1, tag2) = match tags {
            [] => (0, 0),
            [t] => {
                let t = parse_field(t, line_no)?;
                (t, t)
            }
            [t1, t2, ..] => (parse_field(t1, line_no)?, parse_field(t2, line_no)?),
        };

        let mut n = [0usize; 4];
        for (slot, field) in n.iter_mut().zip(node_fields) {
            let id: u64 = parse_field(field, line_no)?;
            *slot = *ids
                .get(&id)
                .ok_or_else(|| MeshIoError::invalid(line_no, format!("unknown node id {id}")))?;
        }
        elements.push(match kind {
            ElementKind::Triangle => Element::triangle([n[0], n[1], n[2]], tag1, tag2),
            ElementKind::Tetrahedron => Element::tetrahedron(n, tag1, tag2),
        });
    }
    if skipped > 0 {
        debug!(skipped, "skipped elements other than triangles and tetrahedra");
    }
    Ok(())
}

fn parse_field<T>(field: &str, line_no: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field
        .parse()
        .map_err(|e| MeshIoError::invalid(line_no, format!("`{field}`: {e}")).into())
}

/// Line cursor with 1-based line numbers.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last: 0,
        }
    }

    fn next_nonblank(&mut self) -> Option<(usize, &'a str)> {
        for (i, line) in self.inner.by_ref() {
            self.last = i + 1;
            let line = line.trim();
            if !line.is_empty() {
                return Some((i + 1, line));
            }
        }
        None
    }

    fn next_required(&mut self) -> Result<(usize, &'a str)> {
        let eof = self.last + 1;
        self.next_nonblank()
            .ok_or_else(|| MeshIoError::invalid(eof, "unexpected end of file").into())
    }

    fn next_count(&mut self) -> Result<usize> {
        let (line_no, line) = self.next_required()?;
        parse_field(line, line_no)
    }

    fn expect(&mut self, marker: &str) -> Result<()> {
        let (line_no, line) = self.next_required()?;
        if line == marker {
            Ok(())
        } else {
            Err(MeshIoError::invalid(line_no, format!("expected {marker}, found `{line}`")).into())
        }
    }

    fn skip_to(&mut self, marker: &str) -> Result<()> {
        loop {
            let (_, line) = self.next_required()?;
            if line == marker {
                return Ok(());
            }
        }
    }
}

/// Writes a mesh as MSH 2.2 ASCII.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_msh(path: &Path, mesh: &TaggedMesh) -> Result<()> {
    write_file(path, mesh, None)
}

/// Writes a mesh with a nodal potential stored as `$NodeData` named `v`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_msh_with_potential(path: &Path, mesh: &TaggedMesh, potential: &[f64]) -> Result<()> {
    write_file(path, mesh, Some(potential))
}

fn write_file(path: &Path, mesh: &TaggedMesh, potential: Option<&[f64]>) -> Result<()> {
    let file = File::create(path).map_err(|e| PlannerError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_msh_to(&mut writer, mesh, potential)
        .and_then(|()| writer.flush())
        .map_err(|e| PlannerError::io(path, e))?;
    debug!(path = %path.display(), nodes = mesh.node_count(), "wrote mesh");
    Ok(())
}

/// Serialises a mesh (and optional potential) to any writer.
///
/// # Errors
///
/// Returns any error of the underlying writer.
pub fn write_msh_to<W: Write>(writer: &mut W, mesh: &TaggedMesh, potential: Option<&[f64]>) -> std::io::Result<()> {
    writeln!(writer, "$MeshFormat\n2.2 0 8\n$EndMeshFormat")?;

    writeln!(writer, "$Nodes\n{}", mesh.node_count())?;
    for (i, p) in mesh.nodes().iter().enumerate() {
        writeln!(writer, "{} {} {} {}", i + 1, p.x, p.y, p.z)?;
    }
    writeln!(writer, "$EndNodes")?;

    writeln!(writer, "$Elements\n{}", mesh.element_count())?;
    for (i, e) in mesh.elements().iter().enumerate() {
        write!(writer, "{} {} 2 {} {}", i + 1, e.kind.gmsh_type(), e.tag1, e.tag2)?;
        for n in e.node_ids() {
            write!(writer, " {}", n + 1)?;
        }
        writeln!(writer)?;
    }
    writeln!(writer, "$EndElements")?;

    if let Some(values) = potential {
        writeln!(writer, "$NodeData\n1\n\"v\"\n1\n0.0\n3\n0\n1\n{}", values.len())?;
        for (i, v) in values.iter().enumerate() {
            writeln!(writer, "{} {v}", i + 1)?;
        }
        writeln!(writer, "$EndNodeData")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mesh::tests::two_tets;

    const SAMPLE: &str = "$MeshFormat\r\n2.2 0 8\r\n$EndMeshFormat\r\n\
$Nodes\r\n5\r\n\
10 0 0 0\r\n11 1 0 0\r\n12 0 1 0\r\n13 0 0 1\r\n14 1 1 1\r\n$EndNodes\r\n\
$Elements\r\n5\r\n\
1 15 2 0 1 10\r\n\
2 4 2 5 5 10 11 12 13\r\n\
3 2 1 1005 10 11 12\r\n\
4 1 2 0 1 10 11\r\n\
5 4 3 7 8 99 11 12 13 14\r\n$EndElements\r\n\
$ElementData\r\n1\r\n\"x\"\r\n$EndElementData\r\n";

    #[test]
    fn parses_crlf_file_with_foreign_elements() {
        let mesh = parse_msh(&sanitize_line_endings(SAMPLE)).unwrap();
        assert_eq!(mesh.node_count(), 5);
        assert_eq!(mesh.element_count(), 3);
        let tri = mesh.triangles()[0];
        assert_eq!((tri.tag1, tri.tag2), (1005, 1005));
        assert_eq!(tri.nodes[..3], [0, 1, 2]);
        let tets = mesh.tetrahedra();
        assert_eq!(tets[0].nodes, [0, 1, 2, 3]);
        assert_eq!((tets[1].tag1, tets[1].tag2), (7, 8));
        assert_eq!(tets[1].nodes, [1, 2, 3, 4]);
    }

    #[test]
    fn write_then_read_is_exact() {
        let mut mesh = two_tets(5, 7);
        mesh.nodes_mut()[4] = Point3::new(0.1 + 0.2, -1.0 / 3.0, 1e-17);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.msh");
        write_msh(&path, &mesh).unwrap();
        assert_eq!(read_msh(&path).unwrap(), mesh);
    }

    #[test]
    fn node_data_is_written_and_skipped() {
        let mesh = two_tets(5, 7);
        let mut buf = Vec::new();
        write_msh_to(&mut buf, &mesh, Some(&[0.0, 0.5, 1.0, 1.5, 2.0])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("$NodeData\n1\n\"v\"\n"));
        assert!(text.contains("\n5 2\n$EndNodeData"));
        assert_eq!(parse_msh(&text).unwrap(), mesh);
    }

    #[test]
    fn rejects_binary_and_other_versions() {
        let binary = "$MeshFormat\n2.2 1 8\n$EndMeshFormat\n";
        assert!(matches!(
            parse_msh(binary).unwrap_err(),
            PlannerError::MeshIo(MeshIoError::Unsupported(_))
        ));
        let v4 = "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n";
        assert!(parse_msh(v4).is_err());
        assert!(parse_msh("$Nodes\n0\n$EndNodes\n").is_err());
    }

    #[test]
    fn reports_line_of_bad_reference() {
        let text = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n$Nodes\n1\n1 0 0 0\n$EndNodes\n\
$Elements\n1\n1 2 2 1 1 1 1 7\n$EndElements\n";
        let err = parse_msh(text).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::MeshIo(MeshIoError::InvalidContent { line: 10, .. })
        ));
    }

    #[test]
    fn truncated_file_is_invalid() {
        let text = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n$Nodes\n3\n1 0 0 0\n";
        assert!(matches!(
            parse_msh(text).unwrap_err(),
            PlannerError::MeshIo(MeshIoError::InvalidContent { .. })
        ));
    }

    #[test]
    fn missing_file() {
        let err = read_msh(Path::new("/nonexistent/head.msh")).unwrap_err();
        assert!(matches!(err, PlannerError::MeshIo(MeshIoError::FileNotFound { .. })));
    }
}
