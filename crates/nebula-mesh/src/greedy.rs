//! Greedy meshing of opaque cubes.
//!
//! For each axis the chunk is swept slice by slice, including one slice of
//! padding on each side so faces on the chunk boundary are found. Each slice
//! produces a 2D mask of packed face descriptors which is then merged into
//! maximal rectangles of identical cells.
//!
//! ## Mask layout
//!
//! ```text
//! bits  0..15  tile id
//! bit     16   face sign (0 = +axis, 1 = -axis)
//! bits 17..24  light, 0..=255
//! ```
//!
//! Cells store the packed value plus one so that zero means "no face".

use nebula_voxel::{CHUNK_SX, CHUNK_SY, CHUNK_SZ, MAX_LIGHT};

use crate::chunk_mesher::MeshContext;
use crate::neighborhood::VoxelSampler;
use crate::vertex::MeshData;

const DIMS: [i32; 3] = [CHUNK_SX as i32, CHUNK_SY as i32, CHUNK_SZ as i32];

/// Largest slice plane over the three axes.
const MAX_PLANE: usize = {
    let xy = CHUNK_SX * CHUNK_SY;
    let yz = CHUNK_SY * CHUNK_SZ;
    let zx = CHUNK_SZ * CHUNK_SX;
    let m = if xy > yz { xy } else { yz };
    if m > zx { m } else { zx }
};

/// Packs a face descriptor. `negative` selects the -axis face.
#[inline]
pub fn pack_mask(tile: u16, negative: bool, e8: u8) -> u32 {
    u32::from(tile) | (u32::from(negative) << 16) | (u32::from(e8) << 17)
}

/// Tile id of a packed descriptor.
#[inline]
pub fn unpack_tile(packed: u32) -> u16 {
    (packed & 0xFFFF) as u16
}

/// `true` if a packed descriptor faces the positive axis.
#[inline]
pub fn unpack_positive(packed: u32) -> bool {
    (packed >> 16) & 1 == 0
}

/// Light of a packed descriptor scaled to `0.0..=1.0`.
#[inline]
pub fn unpack_emission01(packed: u32) -> f32 {
    ((packed >> 17) & 0xFF) as f32 / 255.0
}

/// Quantizes a `0..=7` light level to `0..=255`.
#[inline]
pub fn light_to_e8(level: u8) -> u8 {
    match level {
        0 => 0,
        l if l >= MAX_LIGHT => 255,
        l => ((u32::from(l) * 255 + 3) / 7) as u8,
    }
}

/// One merged rectangle in slice space.
#[derive(Clone, Copy, Debug)]
struct GreedyQuad {
    d: usize,
    u: usize,
    v: usize,
    slice: i32,
    i: usize,
    j: usize,
    w: usize,
    h: usize,
    packed: u32,
}

/// Appends greedy-merged faces of every opaque cube to `out`.
pub(crate) fn emit_opaque_greedy<S: VoxelSampler>(ctx: &MeshContext<'_, S>, out: &mut MeshData) {
    let mut mask = vec![0u32; MAX_PLANE];

    for d in 0..3 {
        let u = (d + 1) % 3;
        let v = (d + 2) % 3;
        let nu = DIMS[u] as usize;
        let nv = DIMS[v] as usize;

        for slice in -1..DIMS[d] {
            build_mask(ctx, &mut mask, d, u, v, slice, nu, nv);
            merge_mask(ctx, out, &mut mask, d, u, v, slice, nu, nv);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_mask<S: VoxelSampler>(
    ctx: &MeshContext<'_, S>,
    mask: &mut [u32],
    d: usize,
    u: usize,
    v: usize,
    slice: i32,
    nu: usize,
    nv: usize,
) {
    let reg = ctx.registry;
    // In the padding slices the outside cell belongs to a neighbor, which
    // owns any face whose opaque side it is.
    let a_inside = slice >= 0;
    let b_inside = slice + 1 < DIMS[d];
    let mut n = 0;
    for j in 0..nv {
        for i in 0..nu {
            let mut a = [0i32; 3];
            a[d] = slice;
            a[u] = i as i32;
            a[v] = j as i32;
            let mut b = a;
            b[d] += 1;

            let a_id = ctx.sampler.block(a[0], a[1], a[2]);
            let b_id = ctx.sampler.block(b[0], b[1], b[2]);
            let a_opaque = reg.is_opaque_cube(a_id);
            let b_opaque = reg.is_opaque_cube(b_id);

            mask[n] = if a_opaque && !b_opaque && a_inside {
                // Face toward +d, lit from the b cell.
                if ctx.occludes(b_id, d, false) {
                    0
                } else {
                    let tile = reg.tile_for(a_id, d, true);
                    let e8 = light_to_e8(ctx.sampler.light(b[0], b[1], b[2]));
                    pack_mask(tile, false, e8) + 1
                }
            } else if b_opaque && !a_opaque && b_inside {
                // Face toward -d, lit from the a cell.
                if ctx.occludes(a_id, d, true) {
                    0
                } else {
                    let tile = reg.tile_for(b_id, d, false);
                    let e8 = light_to_e8(ctx.sampler.light(a[0], a[1], a[2]));
                    pack_mask(tile, true, e8) + 1
                }
            } else {
                0
            };
            n += 1;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_mask<S: VoxelSampler>(
    ctx: &MeshContext<'_, S>,
    out: &mut MeshData,
    mask: &mut [u32],
    d: usize,
    u: usize,
    v: usize,
    slice: i32,
    nu: usize,
    nv: usize,
) {
    let mut n = 0;
    for j in 0..nv {
        let mut i = 0;
        while i < nu {
            let val = mask[n];
            if val == 0 {
                i += 1;
                n += 1;
                continue;
            }

            let mut w = 1;
            while i + w < nu && mask[n + w] == val {
                w += 1;
            }

            let mut h = 1;
            'grow: while j + h < nv {
                let row = n + h * nu;
                for k in 0..w {
                    if mask[row + k] != val {
                        break 'grow;
                    }
                }
                h += 1;
            }

            emit_quad(
                ctx,
                out,
                GreedyQuad {
                    d,
                    u,
                    v,
                    slice,
                    i,
                    j,
                    w,
                    h,
                    packed: val - 1,
                },
            );

            for yy in 0..h {
                let row = n + yy * nu;
                mask[row..row + w].fill(0);
            }
            i += w;
            n += w;
        }
    }
}

fn emit_quad<S: VoxelSampler>(ctx: &MeshContext<'_, S>, out: &mut MeshData, q: GreedyQuad) {
    let mut p = [0f32; 3];
    p[q.d] = (q.slice + 1) as f32;
    p[q.u] = q.i as f32;
    p[q.v] = q.j as f32;

    let mut du = [0f32; 3];
    du[q.u] = q.w as f32;
    let mut dv = [0f32; 3];
    dv[q.v] = q.h as f32;

    let add = |a: [f32; 3], b: [f32; 3]| [a[0] + b[0], a[1] + b[1], a[2] + b[2]];
    let c0 = p;
    let c1 = add(p, du);
    let c2 = add(c1, dv);
    let c3 = add(p, dv);

    let positive = unpack_positive(q.packed);
    let mut normal = [0f32; 3];
    normal[q.d] = if positive { 1.0 } else { -1.0 };

    let (w, h) = (q.w as f32, q.h as f32);
    let uv = if q.d == 0 {
        [[0.0, 0.0], [0.0, w], [h, w], [h, 0.0]]
    } else {
        [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
    };

    let (corners, uvs) = if positive {
        ([c0, c1, c2, c3], uv)
    } else {
        ([c0, c3, c2, c1], [uv[0], uv[3], uv[2], uv[1]])
    };

    ctx.quad(
        out,
        corners,
        normal,
        uvs,
        unpack_tile(q.packed),
        unpack_emission01(q.packed),
    );
}
