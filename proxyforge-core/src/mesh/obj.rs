//! Minimal Wavefront OBJ reading and writing
//!
//! Reads positions and faces (polygons are fan-triangulated, negative
//! indices allowed). Writes positions plus UVs and normals when the mesh
//! carries attribute overlays.

use std::io::Write;
use std::path::Path;

use glam::Vec3;

use super::TriangleMesh;
use crate::error::ProxyError;

/// Load an OBJ file from disk
pub fn read_obj(path: &Path) -> Result<TriangleMesh, ProxyError> {
    let content = std::fs::read_to_string(path).map_err(|source| ProxyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_obj(&content)
}

/// Parse OBJ text into a triangle mesh
pub fn parse_obj(content: &str) -> Result<TriangleMesh, ProxyError> {
    let mut positions = Vec::new();
    let mut triangles = Vec::new();
    let mut face = Vec::with_capacity(4);

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0f32; 3];
                for coord in &mut coords {
                    let token = tokens.next().ok_or_else(|| ProxyError::ObjParse {
                        line: line_no,
                        reason: "vertex needs three coordinates".to_string(),
                    })?;
                    *coord = token.parse().map_err(|_| ProxyError::ObjParse {
                        line: line_no,
                        reason: format!("invalid coordinate `{token}`"),
                    })?;
                }
                positions.push(Vec3::from(coords));
            }
            Some("f") => {
                face.clear();
                for token in tokens {
                    face.push(resolve_index(token, positions.len(), line_no)?);
                }
                if face.len() < 3 {
                    return Err(ProxyError::ObjParse {
                        line: line_no,
                        reason: "face needs at least three vertices".to_string(),
                    });
                }
                for i in 1..face.len() - 1 {
                    triangles.push([face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok(TriangleMesh::from_parts(positions, triangles))
}

/// Resolve a `v`, `v/vt` or `v/vt/vn` face token to a zero-based vertex index
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<u32, ProxyError> {
    let raw = token.split('/').next().unwrap_or(token);
    let value: i64 = raw.parse().map_err(|_| ProxyError::ObjParse {
        line,
        reason: format!("invalid face index `{token}`"),
    })?;
    let resolved = if value < 0 {
        vertex_count as i64 + value
    } else {
        value - 1
    };
    if resolved < 0 || resolved >= vertex_count as i64 {
        return Err(ProxyError::ObjParse {
            line,
            reason: format!("face index {value} out of range"),
        });
    }
    Ok(resolved as u32)
}

/// Write a mesh as OBJ text
pub fn write_obj<W: Write>(mesh: &TriangleMesh, name: &str, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "# {} vertices, {} triangles", mesh.vertex_count(), mesh.triangle_count())?;
    writeln!(out, "o {name}")?;
    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
    }

    let attributes = mesh
        .attributes()
        .filter(|a| (0..mesh.triangle_count()).all(|t| a.uvs.is_set(t) && a.normals.is_set(t)));
    match attributes {
        Some(attributes) => {
            for uv in &attributes.uvs.elements {
                writeln!(out, "vt {} {}", uv.x, uv.y)?;
            }
            for n in &attributes.normals.elements {
                writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
            }
            for (t, tri) in mesh.triangles.iter().enumerate() {
                let uv = attributes.uvs.triangles[t];
                let n = attributes.normals.triangles[t];
                writeln!(
                    out,
                    "f {}/{}/{} {}/{}/{} {}/{}/{}",
                    tri[0] + 1,
                    uv[0] + 1,
                    n[0] + 1,
                    tri[1] + 1,
                    uv[1] + 1,
                    n[1] + 1,
                    tri[2] + 1,
                    uv[2] + 1,
                    n[2] + 1
                )?;
            }
        }
        None => {
            for tri in &mesh.triangles {
                writeln!(out, "f {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quad_fan() {
        let mesh = parse_obj(
            "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\n",
        )
        .unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_negative_indices() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_out_of_range_index() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, ProxyError::ObjParse { line: 2, .. }));
    }

    #[test]
    fn test_written_cube_parses_back() {
        let cube = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(100.0));
        let mut text = Vec::new();
        write_obj(&cube, "SM_Cube", &mut text).unwrap();
        let parsed = parse_obj(std::str::from_utf8(&text).unwrap()).unwrap();
        assert_eq!(parsed.triangles, cube.triangles);
        assert!(parsed.is_closed());
    }
}
