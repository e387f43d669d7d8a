//! Per-face emission of translucent cubes.
//!
//! Translucent faces are never merged: they are blended in draw order and a
//! merged quad would sort as one surface.

use nebula_voxel::{AIR, BlockId, CHUNK_SX, CHUNK_SY, CHUNK_SZ};

use crate::chunk_mesher::MeshContext;
use crate::neighborhood::VoxelSampler;
use crate::vertex::MeshData;

const ALPHA_UV: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Appends the visible faces of every translucent cube to `out`.
pub(crate) fn emit_alpha_cubes<S: VoxelSampler>(ctx: &MeshContext<'_, S>, out: &mut MeshData) {
    let reg = ctx.registry;
    for y in 0..CHUNK_SY as i32 {
        for z in 0..CHUNK_SZ as i32 {
            for x in 0..CHUNK_SX as i32 {
                let id = ctx.sampler.block(x, y, z);
                if id == AIR || !reg.is_cube(id) || !reg.is_alpha(id) {
                    continue;
                }
                emit_cube_faces(ctx, out, x, y, z, id);
            }
        }
    }
}

fn emit_cube_faces<S: VoxelSampler>(
    ctx: &MeshContext<'_, S>,
    out: &mut MeshData,
    lx: i32,
    ly: i32,
    lz: i32,
    id: BlockId,
) {
    let reg = ctx.registry;
    let s = ctx.sampler;
    // Translucent cubes show the light of their own cell.
    let emission = ctx.light01(lx, ly, lz);

    let (x0, y0, z0) = (lx as f32, ly as f32, lz as f32);
    let (x1, y1, z1) = (x0 + 1.0, y0 + 1.0, z0 + 1.0);

    // (neighbor, axis, neighbor face sign, corners, normal, face sign)
    let faces = [
        (
            s.block(lx + 1, ly, lz),
            0,
            false,
            [[x1, y0, z1], [x1, y0, z0], [x1, y1, z0], [x1, y1, z1]],
            [1.0, 0.0, 0.0],
            true,
        ),
        (
            s.block(lx - 1, ly, lz),
            0,
            true,
            [[x0, y0, z0], [x0, y0, z1], [x0, y1, z1], [x0, y1, z0]],
            [-1.0, 0.0, 0.0],
            false,
        ),
        (
            s.block(lx, ly + 1, lz),
            1,
            false,
            [[x0, y1, z1], [x1, y1, z1], [x1, y1, z0], [x0, y1, z0]],
            [0.0, 1.0, 0.0],
            true,
        ),
        (
            s.block(lx, ly - 1, lz),
            1,
            true,
            [[x0, y0, z0], [x1, y0, z0], [x1, y0, z1], [x0, y0, z1]],
            [0.0, -1.0, 0.0],
            false,
        ),
        (
            s.block(lx, ly, lz + 1),
            2,
            false,
            [[x0, y0, z1], [x1, y0, z1], [x1, y1, z1], [x0, y1, z1]],
            [0.0, 0.0, 1.0],
            true,
        ),
        (
            s.block(lx, ly, lz - 1),
            2,
            true,
            [[x1, y0, z0], [x0, y0, z0], [x0, y1, z0], [x1, y1, z0]],
            [0.0, 0.0, -1.0],
            false,
        ),
    ];

    for (neighbor, axis, neighbor_face, corners, normal, positive) in faces {
        if should_emit_face(ctx, id, neighbor, axis, neighbor_face) {
            ctx.quad(
                out,
                corners,
                normal,
                ALPHA_UV,
                reg.tile_for(id, axis, positive),
                emission,
            );
        }
    }
}

/// Faces between two cells of the same translucent block are internal.
/// Another translucent neighbor never hides a face; otherwise the neighbor's
/// occlusion rule decides.
fn should_emit_face<S: VoxelSampler>(
    ctx: &MeshContext<'_, S>,
    self_id: BlockId,
    neighbor: BlockId,
    axis: usize,
    neighbor_face: bool,
) -> bool {
    if neighbor == self_id {
        return false;
    }
    if neighbor != AIR && ctx.registry.is_alpha(neighbor) {
        return true;
    }
    !ctx.occludes(neighbor, axis, neighbor_face)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_mesher::tests::{GLASS, STONE, WATER, assert_winding, build, ready_chunk};

    fn quads(mesh: &MeshData) -> usize {
        mesh.index_count() / 6
    }

    #[test]
    fn test_lone_glass_has_six_faces() {
        let c = ready_chunk();
        c.set_block(3, 3, 3, GLASS);
        let mesh = build(&c).alpha;
        assert_eq!(quads(&mesh), 6);
        assert_winding(&mesh);
        for q in mesh.vertices.chunks(4) {
            let uvs: Vec<[f32; 2]> = q.iter().map(|v| v.local_uv).collect();
            assert_eq!(uvs, ALPHA_UV.to_vec());
        }
    }

    #[test]
    fn test_same_block_faces_are_internal() {
        let c = ready_chunk();
        for x in 0..4 {
            c.set_block(x, 70, 0, WATER);
        }
        // Four cells, no merging: 4 tops + 4 bottoms + 4 (-Z) + 4 (+Z) + 2 ends.
        assert_eq!(quads(&build(&c).alpha), 18);
    }

    #[test]
    fn test_different_translucent_neighbors_both_draw() {
        let c = ready_chunk();
        c.set_block(3, 3, 3, GLASS);
        c.set_block(4, 3, 3, WATER);
        assert_eq!(quads(&build(&c).alpha), 12);
    }

    #[test]
    fn test_opaque_neighbor_hides_face() {
        let c = ready_chunk();
        c.set_block(3, 3, 3, GLASS);
        c.set_block(3, 2, 3, STONE);
        let alpha = build(&c).alpha;
        assert_eq!(quads(&alpha), 5);
        assert!(alpha.vertices.iter().all(|v| v.normal != [0.0, -1.0, 0.0]));
    }

    #[test]
    fn test_own_cell_light() {
        let c = ready_chunk();
        c.set_block(3, 3, 3, GLASS);
        c.set_light(3, 3, 3, 7);
        c.set_light(3, 4, 3, 2);
        let alpha = build(&c).alpha;
        assert!(alpha.vertices.iter().all(|v| v.emission == 1.0));
    }
}
