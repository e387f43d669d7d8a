//! Per-block geometry for the four ramp shapes.
//!
//! A ramp has a bottom quad, one full side quad on its high edge, two
//! triangular sides and the slanted top. Every face except the slanted one
//! is culled when the outward neighbor fully covers it. Ramps are written to
//! the opaque buffer.

use nebula_voxel::{BlockId, CHUNK_SX, CHUNK_SY, CHUNK_SZ, Shape};

use crate::chunk_mesher::MeshContext;
use crate::neighborhood::VoxelSampler;
use crate::vertex::MeshData;

const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Standard local UVs of a side or bottom quad.
const QUAD_UV: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
/// Local UVs of a quad wound from the other corner.
const QUAD_UV_ROT: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

/// Appends geometry for every ramp in the chunk to `out`.
pub(crate) fn emit_slopes<S: VoxelSampler>(ctx: &MeshContext<'_, S>, out: &mut MeshData) {
    for y in 0..CHUNK_SY as i32 {
        for z in 0..CHUNK_SZ as i32 {
            for x in 0..CHUNK_SX as i32 {
                let id = ctx.sampler.block(x, y, z);
                if ctx.registry.is_slope(id) {
                    emit_slope(ctx, out, x, y, z, id);
                }
            }
        }
    }
}

/// Outward neighbor directions.
#[derive(Clone, Copy)]
enum Dir {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Dir {
    fn offset(self) -> (i32, i32, i32) {
        match self {
            Dir::PosX => (1, 0, 0),
            Dir::NegX => (-1, 0, 0),
            Dir::PosY => (0, 1, 0),
            Dir::NegY => (0, -1, 0),
            Dir::PosZ => (0, 0, 1),
            Dir::NegZ => (0, 0, -1),
        }
    }
}

fn emit_slope<S: VoxelSampler>(
    ctx: &MeshContext<'_, S>,
    out: &mut MeshData,
    lx: i32,
    ly: i32,
    lz: i32,
    id: BlockId,
) {
    let def = ctx.registry.def(id);
    let (t_bottom, t_side, t_slope) = (def.tile_bottom, def.tile_side, def.tile_top);

    let (x0, y0, z0) = (lx as f32, ly as f32, lz as f32);
    let (x1, y1, z1) = (x0 + 1.0, y0 + 1.0, z0 + 1.0);

    let s = ctx.sampler;
    let below = s.block(lx, ly - 1, lz);
    let nx_n = s.block(lx - 1, ly, lz);
    let nx_p = s.block(lx + 1, ly, lz);
    let nz_n = s.block(lx, ly, lz - 1);
    let nz_p = s.block(lx, ly, lz + 1);

    let light = |dir: Dir| {
        let (ox, oy, oz) = dir.offset();
        ctx.light01(lx + ox, ly + oy, lz + oz)
    };

    if !ctx.occludes(below, 1, true) {
        ctx.quad(
            out,
            [[x0, y0, z0], [x1, y0, z0], [x1, y0, z1], [x0, y0, z1]],
            [0.0, -1.0, 0.0],
            QUAD_UV,
            t_bottom,
            light(Dir::NegY),
        );
    }

    match def.shape {
        Shape::SlopeXp => {
            if !ctx.occludes(nx_n, 0, true) {
                ctx.quad(
                    out,
                    [[x0, y0, z0], [x0, y0, z1], [x0, y1, z1], [x0, y1, z0]],
                    [-1.0, 0.0, 0.0],
                    QUAD_UV,
                    t_side,
                    light(Dir::NegX),
                );
            }
            if !ctx.occludes(nz_n, 2, true) {
                ctx.tri(
                    out,
                    [[x0, y0, z0], [x0, y1, z0], [x1, y0, z0]],
                    [0.0, 0.0, -1.0],
                    [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]],
                    t_side,
                    light(Dir::NegZ),
                );
            }
            if !ctx.occludes(nz_p, 2, false) {
                ctx.tri(
                    out,
                    [[x0, y0, z1], [x1, y0, z1], [x0, y1, z1]],
                    [0.0, 0.0, 1.0],
                    [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                    t_side,
                    light(Dir::PosZ),
                );
            }
            ctx.quad(
                out,
                [[x0, y1, z0], [x0, y1, z1], [x1, y0, z1], [x1, y0, z0]],
                [INV_SQRT2, INV_SQRT2, 0.0],
                QUAD_UV,
                t_slope,
                light(Dir::PosY),
            );
        }
        Shape::SlopeXn => {
            if !ctx.occludes(nx_p, 0, false) {
                ctx.quad(
                    out,
                    [[x1, y0, z0], [x1, y1, z0], [x1, y1, z1], [x1, y0, z1]],
                    [1.0, 0.0, 0.0],
                    QUAD_UV_ROT,
                    t_side,
                    light(Dir::PosX),
                );
            }
            if !ctx.occludes(nz_n, 2, true) {
                ctx.tri(
                    out,
                    [[x0, y0, z0], [x1, y1, z0], [x1, y0, z0]],
                    [0.0, 0.0, -1.0],
                    [[0.0, 0.0], [1.0, 1.0], [1.0, 0.0]],
                    t_side,
                    light(Dir::NegZ),
                );
            }
            if !ctx.occludes(nz_p, 2, false) {
                ctx.tri(
                    out,
                    [[x0, y0, z1], [x1, y0, z1], [x1, y1, z1]],
                    [0.0, 0.0, 1.0],
                    [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
                    t_side,
                    light(Dir::PosZ),
                );
            }
            ctx.quad(
                out,
                [[x1, y1, z0], [x0, y0, z0], [x0, y0, z1], [x1, y1, z1]],
                [-INV_SQRT2, INV_SQRT2, 0.0],
                QUAD_UV_ROT,
                t_slope,
                light(Dir::PosY),
            );
        }
        Shape::SlopeZp => {
            if !ctx.occludes(nz_p, 2, false) {
                ctx.quad(
                    out,
                    [[x0, y0, z1], [x1, y0, z1], [x1, y1, z1], [x0, y1, z1]],
                    [0.0, 0.0, 1.0],
                    QUAD_UV,
                    t_side,
                    light(Dir::PosZ),
                );
            }
            if !ctx.occludes(nx_n, 0, true) {
                ctx.tri(
                    out,
                    [[x0, y0, z0], [x0, y0, z1], [x0, y1, z1]],
                    [-1.0, 0.0, 0.0],
                    [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
                    t_side,
                    light(Dir::NegX),
                );
            }
            if !ctx.occludes(nx_p, 0, false) {
                ctx.tri(
                    out,
                    [[x1, y0, z0], [x1, y1, z1], [x1, y0, z1]],
                    [1.0, 0.0, 0.0],
                    [[0.0, 0.0], [1.0, 1.0], [1.0, 0.0]],
                    t_side,
                    light(Dir::PosX),
                );
            }
            ctx.quad(
                out,
                [[x0, y1, z1], [x1, y1, z1], [x1, y0, z0], [x0, y0, z0]],
                [0.0, INV_SQRT2, -INV_SQRT2],
                [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
                t_slope,
                light(Dir::PosY),
            );
        }
        Shape::SlopeZn => {
            if !ctx.occludes(nz_n, 2, true) {
                ctx.quad(
                    out,
                    [[x0, y0, z0], [x0, y1, z0], [x1, y1, z0], [x1, y0, z0]],
                    [0.0, 0.0, -1.0],
                    QUAD_UV_ROT,
                    t_side,
                    light(Dir::NegZ),
                );
            }
            if !ctx.occludes(nx_n, 0, true) {
                ctx.tri(
                    out,
                    [[x0, y0, z0], [x0, y0, z1], [x0, y1, z0]],
                    [-1.0, 0.0, 0.0],
                    [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                    t_side,
                    light(Dir::NegX),
                );
            }
            if !ctx.occludes(nx_p, 0, false) {
                ctx.tri(
                    out,
                    [[x1, y0, z0], [x1, y1, z0], [x1, y0, z1]],
                    [1.0, 0.0, 0.0],
                    [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]],
                    t_side,
                    light(Dir::PosX),
                );
            }
            ctx.quad(
                out,
                [[x0, y1, z0], [x0, y0, z1], [x1, y0, z1], [x1, y1, z0]],
                [0.0, INV_SQRT2, INV_SQRT2],
                QUAD_UV_ROT,
                t_slope,
                light(Dir::PosY),
            );
        }
        Shape::Air | Shape::Cube => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_mesher::tests::{STONE, assert_winding, build, ready_chunk};

    const SLOPE_XP: BlockId = 11;
    const SLOPE_XN: BlockId = 12;
    const SLOPE_ZP: BlockId = 13;
    const SLOPE_ZN: BlockId = 14;

    #[test]
    fn test_free_standing_ramps() {
        for id in [SLOPE_XP, SLOPE_XN, SLOPE_ZP, SLOPE_ZN] {
            let c = ready_chunk();
            c.set_block(7, 50, 7, id);
            let mesh = build(&c).opaque;
            // Bottom, high side and ramp quads plus two triangles.
            assert_eq!(mesh.index_count(), 3 * 6 + 2 * 3, "ramp {id}");
            assert_eq!(mesh.vertex_count(), 3 * 4 + 2 * 3, "ramp {id}");
            assert_winding(&mesh);
        }
    }

    #[test]
    fn test_ground_hides_bottom() {
        let c = ready_chunk();
        c.set_block(7, 50, 7, SLOPE_ZP);
        c.set_block(7, 49, 7, STONE);
        let mesh = build(&c).opaque;
        let ramp_bottoms = mesh
            .vertices
            .iter()
            .filter(|v| v.normal == [0.0, -1.0, 0.0] && v.position[1] == 50.0)
            .count();
        assert_eq!(ramp_bottoms, 0);
    }

    #[test]
    fn test_wall_hides_high_side_but_not_ramp() {
        let c = ready_chunk();
        c.set_block(7, 50, 7, SLOPE_XP);
        c.set_block(6, 50, 7, STONE);
        let mesh = build(&c).opaque;
        let ramp_faces: Vec<[f32; 3]> = mesh
            .vertices
            .iter()
            .filter(|v| v.position[0] >= 7.0 && v.position[0] <= 8.0 && v.normal != [1.0, 0.0, 0.0])
            .map(|v| v.normal)
            .collect();
        assert!(!ramp_faces.contains(&[-1.0, 0.0, 0.0]));
        assert!(ramp_faces.contains(&[INV_SQRT2, INV_SQRT2, 0.0]));
    }

    #[test]
    fn test_ramp_face_is_lit_from_above() {
        let c = ready_chunk();
        c.set_block(7, 50, 7, SLOPE_ZN);
        c.set_light(7, 51, 7, 7);
        c.set_light(7, 49, 7, 0);
        let mesh = build(&c).opaque;
        for v in &mesh.vertices {
            let expected = if v.normal == [0.0, INV_SQRT2, INV_SQRT2] { 1.0 } else { 0.0 };
            assert_eq!(v.emission, expected);
        }
    }

    #[test]
    fn test_ramps_do_not_enter_alpha() {
        let c = ready_chunk();
        c.set_block(1, 1, 1, SLOPE_XN);
        assert!(build(&c).alpha.is_empty());
    }
}
