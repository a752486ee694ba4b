//! Curved screen mesh
//!
//! Builds the arc of a vertical cylinder (radius `z`, centered on the viewer)
//! that carries the pass-through camera image. The arc spans `w / z` radians
//! around the +Z axis and is cut into `divisions` slices; every slice is one
//! quad of the index buffer.

use std::f32::consts::PI;

use log::debug;

use crate::error::{Error, Result};
use crate::vertex::Vertex;

/// Reference subdivision count of the arc.
pub const DEFAULT_DIVISIONS: u32 = 100;

/// Upper bound on the subdivision count; keeps the mesh small and every
/// vertex index within `u32`.
pub const MAX_DIVISIONS: u32 = 1 << 16;

/// World-space placement and size of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    /// Horizontal placement basis. The curved construction is centered on the
    /// viewer and does not read it.
    pub x: f32,
    /// Height of the bottom edge.
    pub y: f32,
    /// Distance from the viewer; also the radius of curvature.
    pub z: f32,
    /// Arc length; the angular span is `w / z`.
    pub w: f32,
    /// Vertical extent.
    pub h: f32,
    pub divisions: u32,
    /// Carried for alternate construction strategies; ignored by the curved path.
    pub reversing: bool,
    /// Carried for alternate construction strategies; ignored by the curved path.
    pub curved: bool,
}

impl ScreenGeometry {
    pub fn new(x: f32, y: f32, z: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            z,
            w,
            h,
            divisions: DEFAULT_DIVISIONS,
            reversing: false,
            curved: true,
        }
    }

    pub fn with_divisions(mut self, divisions: u32) -> Self {
        self.divisions = divisions;
        self
    }

    /// Angular span of the arc in radians.
    pub fn radian(&self) -> f32 {
        self.w / self.z
    }

    /// Angle of the first (U = 1) edge of the arc.
    pub fn start_angle(&self) -> f32 {
        (PI + self.radian()) / 2.0
    }

    /// Angle of the slice edge `i`, `0..=divisions`.
    pub fn angle_at(&self, i: u32) -> f32 {
        let step = self.radian() / self.divisions as f32;
        self.start_angle() - i as f32 * step
    }

    fn validate(&self) -> Result<()> {
        if !(self.z > 0.0) || !self.z.is_finite() {
            return Err(Error::InvalidGeometry(format!(
                "screen distance must be positive and finite, got z = {}",
                self.z
            )));
        }
        if self.divisions == 0 {
            return Err(Error::InvalidGeometry("screen needs at least one division".into()));
        }
        if self.divisions > MAX_DIVISIONS {
            return Err(Error::InvalidGeometry(format!(
                "screen divisions {} exceed the limit of {MAX_DIVISIONS}",
                self.divisions
            )));
        }
        for (name, value) in [("x", self.x), ("y", self.y), ("w", self.w), ("h", self.h)] {
            if !value.is_finite() {
                return Err(Error::InvalidGeometry(format!("{name} is not finite")));
            }
        }
        Ok(())
    }
}

/// Vertex and index data of the curved screen. Immutable once built.
///
/// Indices come in groups of four, one group per slice, each group listing
/// the corners of the slice in cyclic order (top, bottom, next bottom, next
/// top). Consecutive groups share an edge, so the arc is covered exactly once.
#[derive(Debug, Clone)]
pub struct ScreenMesh {
    geometry: ScreenGeometry,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl ScreenMesh {
    pub fn build(geometry: &ScreenGeometry) -> Result<Self> {
        geometry.validate()?;
        if geometry.reversing || !geometry.curved {
            debug!(
                "screen flags reversing={} curved={} are not used by the curved construction",
                geometry.reversing, geometry.curved
            );
        }

        let divisions = geometry.divisions;
        let (y, z, h) = (geometry.y, geometry.z, geometry.h);
        let mut vertices = Vec::with_capacity(2 * (divisions as usize + 1));

        for i in 0..=divisions {
            let ir = geometry.angle_at(i);
            let (sin, cos) = ir.sin_cos();
            let u = 1.0 - i as f32 / divisions as f32;
            let bottom = Vertex::new([z * cos, y, z * sin], u, 0.0);
            let top = Vertex::new([z * cos, y + h, z * sin], u, 1.0);
            // The leading edge goes top-first so every slice lists its corners
            // in the same rotational order.
            if i == 0 {
                vertices.push(top);
                vertices.push(bottom);
            } else {
                vertices.push(bottom);
                vertices.push(top);
            }
        }

        let mut indices = Vec::with_capacity(4 * divisions as usize);
        let mut index = 0u32;
        indices.extend_from_slice(&[0, 1, 2, 3]);
        index += 3;
        for _ in 1..divisions {
            // Shared edge top then bottom, keeping each group's cyclic order.
            indices.push(index);
            indices.push(index - 1);
            index += 2;
            indices.push(index - 1);
            indices.push(index);
        }

        debug!(
            "built curved screen: {} vertices, {} indices, span {:.3} rad",
            vertices.len(),
            indices.len(),
            geometry.radian()
        );

        Ok(Self {
            geometry: *geometry,
            vertices,
            indices,
        })
    }

    pub fn geometry(&self) -> &ScreenGeometry {
        &self.geometry
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Slices as `[a, b, c, d]` corner quads.
    pub fn quads(&self) -> impl Iterator<Item = [u32; 4]> + '_ {
        self.indices
            .chunks_exact(4)
            .map(|q| [q[0], q[1], q[2], q[3]])
    }

    /// Expands every quad into two triangles sharing its `a`-`c` diagonal.
    pub fn triangle_list(&self) -> Vec<u32> {
        self.quads()
            .flat_map(|[a, b, c, d]| [a, b, c, a, c, d])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn pos(v: &Vertex) -> Vec3 {
        Vec3::from(v.pos)
    }

    fn angle(v: &Vertex) -> f32 {
        v.pos[2].atan2(v.pos[0])
    }

    #[test]
    fn test_buffer_sizes() {
        for divisions in [1, 2, 7, 100] {
            let geometry = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(divisions);
            let mesh = ScreenMesh::build(&geometry).unwrap();
            let d = divisions as usize;
            assert_eq!(mesh.vertices().len(), 2 * (d + 1));
            assert_eq!(mesh.indices().len(), 4 + 4 * (d - 1));
            assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertices().len()));
        }
    }

    #[test]
    fn test_reference_index_sequence() {
        let mesh = ScreenMesh::build(&ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(3)).unwrap();
        assert_eq!(mesh.indices(), &[0, 1, 2, 3, 3, 2, 4, 5, 5, 4, 6, 7]);
    }

    #[test]
    fn test_u_spans_unit_range_and_never_increases() {
        let mesh = ScreenMesh::build(&ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0)).unwrap();
        let us: Vec<f32> = mesh.vertices().iter().map(|v| v.uv[0]).collect();
        assert_eq!(us[0], 1.0);
        assert_eq!(*us.last().unwrap(), 0.0);
        assert!(us.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_v_marks_bottom_and_top() {
        let geometry = ScreenGeometry::new(0.0, -1.0, 3.0, 2.0, 2.5);
        let mesh = ScreenMesh::build(&geometry).unwrap();
        for v in mesh.vertices() {
            if v.uv[1] == 0.0 {
                assert_eq!(v.pos[1], -1.0);
            } else {
                assert_eq!(v.uv[1], 1.0);
                assert!((v.pos[1] - 1.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_vertices_lie_on_the_cylinder() {
        let geometry = ScreenGeometry::new(0.3, 0.5, 4.0, 3.0, 1.0);
        let mesh = ScreenMesh::build(&geometry).unwrap();
        for v in mesh.vertices() {
            let radius = (v.pos[0] * v.pos[0] + v.pos[2] * v.pos[2]).sqrt();
            assert!((radius - 4.0).abs() < 1e-4, "radius {radius}");
        }
    }

    #[test]
    fn test_reference_screen_angles() {
        let geometry = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0);
        let mesh = ScreenMesh::build(&geometry).unwrap();
        let first = &mesh.vertices()[0];
        let last = mesh.vertices().last().unwrap();
        let start = (PI + 0.4) / 2.0;
        assert!((angle(first) - start).abs() < 1e-5);
        assert!((pos(first).length() - 5.0).abs() < 1e-4);
        assert!((angle(last) - (start - 0.4)).abs() < 1e-5);
        assert!((geometry.angle_at(100) - (start - 100.0 * (0.4 / 100.0))).abs() < 1e-6);
    }

    #[test]
    fn test_zero_distance_is_rejected() {
        let err = ScreenMesh::build(&ScreenGeometry::new(0.0, 0.0, 0.0, 2.0, 2.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn test_degenerate_parameters_are_rejected() {
        let no_divisions = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(0);
        assert!(matches!(ScreenMesh::build(&no_divisions), Err(Error::InvalidGeometry(_))));
        let behind = ScreenGeometry::new(0.0, 0.0, -1.0, 2.0, 2.0);
        assert!(matches!(ScreenMesh::build(&behind), Err(Error::InvalidGeometry(_))));
        let nan_width = ScreenGeometry::new(0.0, 0.0, 5.0, f32::NAN, 2.0);
        assert!(matches!(ScreenMesh::build(&nan_width), Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn test_division_count_is_capped() {
        let huge = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(3_000_000_000);
        assert!(matches!(ScreenMesh::build(&huge), Err(Error::InvalidGeometry(_))));
        let over = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(MAX_DIVISIONS + 1);
        assert!(matches!(ScreenMesh::build(&over), Err(Error::InvalidGeometry(_))));

        let mesh = ScreenMesh::build(&ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(MAX_DIVISIONS)).unwrap();
        let last = *mesh.indices().last().unwrap();
        assert_eq!(last as usize, mesh.vertices().len() - 1);
    }

    #[test]
    fn test_quads_tile_the_arc_in_order() {
        let geometry = ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(10);
        let mesh = ScreenMesh::build(&geometry).unwrap();
        let verts = mesh.vertices();
        for (k, quad) in mesh.quads().enumerate() {
            let leading = geometry.angle_at(k as u32);
            let trailing = geometry.angle_at(k as u32 + 1);
            let [a, b, c, d] = quad.map(|i| &verts[i as usize]);
            // a/b on the leading edge, c/d on the trailing edge, top-bottom-bottom-top.
            assert!((angle(a) - leading).abs() < 1e-5 && (angle(b) - leading).abs() < 1e-5);
            assert!((angle(c) - trailing).abs() < 1e-5 && (angle(d) - trailing).abs() < 1e-5);
            assert_eq!([a.uv[1], b.uv[1], c.uv[1], d.uv[1]], [1.0, 0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_triangles_share_one_winding() {
        let mesh = ScreenMesh::build(&ScreenGeometry::new(0.0, 0.0, 5.0, 2.0, 2.0).with_divisions(20)).unwrap();
        let verts = mesh.vertices();
        let tris = mesh.triangle_list();
        assert_eq!(tris.len(), 6 * 20);
        for tri in tris.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| pos(&verts[i as usize]));
            let normal = (b - a).cross(c - a);
            let outward = Vec3::new(a.x + b.x + c.x, 0.0, a.z + b.z + c.z);
            assert!(normal.dot(outward) > 0.0);
        }
    }
}
