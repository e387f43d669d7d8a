//! Block registry: maps the one-byte ids stored in chunks to [`BlockDef`]
//! metadata.
//!
//! The registry is built once during startup and shared read-only afterwards.
//! Air is always id 0 so that zero-initialized chunk memory is empty space,
//! and any id without a definition behaves exactly like air.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::MAX_LIGHT;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Block id as stored in a chunk cell.
pub type BlockId = u8;

/// The air block.
pub const AIR: BlockId = 0;

/// Geometry of a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Shape {
    /// No geometry.
    #[default]
    Air,
    /// Full unit cube.
    Cube,
    /// Ramp rising towards +X (high side at -X is closed).
    SlopeXp,
    /// Ramp rising towards -X.
    SlopeXn,
    /// Ramp rising towards +Z.
    SlopeZp,
    /// Ramp rising towards -Z.
    SlopeZn,
}

impl Shape {
    /// Parses a shape name; unknown or missing names are cubes.
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(str::to_ascii_lowercase).as_deref() {
            Some("air") => Shape::Air,
            Some("slope_xp") => Shape::SlopeXp,
            Some("slope_xn") => Shape::SlopeXn,
            Some("slope_zp") => Shape::SlopeZp,
            Some("slope_zn") => Shape::SlopeZn,
            _ => Shape::Cube,
        }
    }

    /// `true` for the four ramp shapes.
    pub fn is_slope(self) -> bool {
        matches!(
            self,
            Shape::SlopeXp | Shape::SlopeXn | Shape::SlopeZp | Shape::SlopeZn
        )
    }

    /// Bitmask of the axis-aligned faces this shape fully closes.
    fn full_face_mask(self) -> u8 {
        match self {
            Shape::Air => 0,
            Shape::Cube => FACE_ALL,
            Shape::SlopeXp => face_bit(1, false) | face_bit(0, false),
            Shape::SlopeXn => face_bit(1, false) | face_bit(0, true),
            Shape::SlopeZp => face_bit(1, false) | face_bit(2, true),
            Shape::SlopeZn => face_bit(1, false) | face_bit(2, false),
        }
    }
}

const FACE_ALL: u8 = 0b11_1111;

/// Bit for the face on `axis` (0 = X, 1 = Y, 2 = Z) facing `+` or `-`.
const fn face_bit(axis: usize, positive: bool) -> u8 {
    1 << (axis * 2 + positive as usize)
}

/// Render queue a block's geometry belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    /// Not rendered.
    #[default]
    None,
    /// Depth-written opaque pass.
    Opaque,
    /// Alpha-blended pass (glass, water).
    Alpha,
}

impl RenderLayer {
    /// Parses a layer name; unknown or missing names are opaque.
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(str::to_ascii_lowercase).as_deref() {
            Some("none") => RenderLayer::None,
            Some("alpha") => RenderLayer::Alpha,
            _ => RenderLayer::Opaque,
        }
    }
}

/// Movement parameters of a fluid block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidDef {
    /// Velocity damping while submerged.
    pub drag: f32,
    /// Upward acceleration while submerged.
    pub buoyancy: f32,
    /// Gravity multiplier while submerged.
    pub gravity_scale: f32,
    /// Walk speed multiplier while submerged.
    pub move_scale: f32,
}

impl Default for FluidDef {
    fn default() -> Self {
        Self {
            drag: 6.0,
            buoyancy: 0.0,
            gravity_scale: 0.25,
            move_scale: 0.60,
        }
    }
}

/// Full descriptor for a block type.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockDef {
    /// Id stored in chunk cells.
    pub id: BlockId,
    /// Unique lowercase name, e.g. `"glass"`.
    pub name: String,
    /// Hides neighboring faces and blocks light.
    pub opaque: bool,
    /// Collides with entities.
    pub solid: bool,
    /// Geometry.
    pub shape: Shape,
    /// Render queue.
    pub render_layer: RenderLayer,
    /// Atlas tile of the +Y face.
    pub tile_top: u16,
    /// Atlas tile of the horizontal faces.
    pub tile_side: u16,
    /// Atlas tile of the -Y face.
    pub tile_bottom: u16,
    /// Light emission in `0.0..=1.0`.
    pub emission: f32,
    /// Present for fluid blocks.
    pub fluid: Option<FluidDef>,
}

impl BlockDef {
    /// A solid opaque cube with the given tiles.
    pub fn cube(id: BlockId, name: &str, top: u16, side: u16, bottom: u16) -> Self {
        Self {
            id,
            name: name.to_string(),
            opaque: true,
            solid: true,
            shape: Shape::Cube,
            render_layer: RenderLayer::Opaque,
            tile_top: top,
            tile_side: side,
            tile_bottom: bottom,
            emission: 0.0,
            fluid: None,
        }
    }

    /// Builder: sets the emission.
    pub fn with_emission(mut self, emission: f32) -> Self {
        self.emission = emission;
        self
    }

    /// Builder: sets the shape.
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Builder: moves the block to the alpha layer and makes it see-through.
    pub fn translucent(mut self) -> Self {
        self.opaque = false;
        self.render_layer = RenderLayer::Alpha;
        self
    }

    fn air() -> Self {
        Self {
            id: AIR,
            name: "air".to_string(),
            opaque: false,
            solid: false,
            shape: Shape::Air,
            render_layer: RenderLayer::None,
            tile_top: 0,
            tile_side: 0,
            tile_bottom: 0,
            emission: 0.0,
            fluid: None,
        }
    }
}

/// Errors that can occur while loading block definitions.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The definitions file could not be read.
    #[error("failed to read block definitions: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not valid JSON.
    #[error("invalid block definitions JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The document has no top-level `blocks` array.
    #[error("block definitions are missing the 'blocks' array")]
    MissingBlocks,
}

// ---------------------------------------------------------------------------
// JSON form
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    id: i64,
    name: Option<String>,
    opaque: Option<bool>,
    solid: Option<bool>,
    emission: Option<f32>,
    shape: Option<String>,
    render_layer: Option<String>,
    tiles: Option<RawTiles>,
    tile_top: Option<u16>,
    tile_side: Option<u16>,
    tile_bottom: Option<u16>,
    fluid: Option<RawFluid>,
}

#[derive(Deserialize)]
struct RawTiles {
    top: Option<u16>,
    side: Option<u16>,
    bottom: Option<u16>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFluid {
    #[serde(rename = "type", default)]
    kind: String,
    drag: Option<f32>,
    buoyancy: Option<f32>,
    gravity_scale: Option<f32>,
    move_scale: Option<f32>,
}

impl RawBlock {
    /// Converts to a definition, or `None` when the id is out of range.
    fn into_def(self) -> Option<BlockDef> {
        let id = BlockId::try_from(self.id).ok()?;
        let not_air = id != AIR;

        let (top, side, bottom) = match self.tiles {
            Some(t) => (t.top, t.side, t.bottom),
            None => (self.tile_top, self.tile_side, self.tile_bottom),
        };
        let top = top.unwrap_or(0);
        let side = side.unwrap_or(top);
        let bottom = bottom.unwrap_or(side);

        let mut solid = self.solid.unwrap_or(not_air);
        let fluid = self
            .fluid
            .filter(|f| f.kind.eq_ignore_ascii_case("water"))
            .map(|f| {
                let d = FluidDef::default();
                FluidDef {
                    drag: f.drag.unwrap_or(d.drag),
                    buoyancy: f.buoyancy.unwrap_or(d.buoyancy),
                    gravity_scale: f.gravity_scale.unwrap_or(d.gravity_scale),
                    move_scale: f.move_scale.unwrap_or(d.move_scale),
                }
            });
        if fluid.is_some() {
            solid = false;
        }

        Some(BlockDef {
            id,
            name: self.name.unwrap_or_else(|| format!("id_{id}")),
            opaque: self.opaque.unwrap_or(not_air),
            solid,
            shape: Shape::parse(self.shape.as_deref()),
            render_layer: RenderLayer::parse(self.render_layer.as_deref()),
            tile_top: top,
            tile_side: side,
            tile_bottom: bottom,
            emission: self.emission.unwrap_or(0.0),
            fluid,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dense 256-entry table of block definitions with name lookup and
/// precomputed per-id flags for the meshing and lighting hot paths.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    defs: Vec<Option<BlockDef>>,
    name_to_id: HashMap<String, BlockId>,
    face_masks: [u8; 256],
    light_levels: [u8; 256],
    air: BlockDef,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl BlockRegistry {
    /// Creates a registry holding air plus the three base terrain blocks.
    pub fn new() -> Self {
        let mut registry = Self {
            defs: vec![None; 256],
            name_to_id: HashMap::new(),
            face_masks: [0; 256],
            light_levels: [0; 256],
            air: BlockDef::air(),
        };
        registry.register(BlockDef::air());
        registry.ensure_base_blocks();
        registry
    }

    /// Creates a registry with the full built-in block set: terrain blocks,
    /// water, glass, two light sources and four ramps.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_extras();
        registry
    }

    /// Creates a registry from a `{"blocks": [...]}` document. Entries that
    /// fail to parse or have ids outside `0..=255` are skipped; the three
    /// base terrain blocks are filled in when the document omits them.
    pub fn load_json(text: &str) -> Result<Self, RegistryError> {
        let root: serde_json::Value = serde_json::from_str(text)?;
        let entries = root
            .get("blocks")
            .and_then(serde_json::Value::as_array)
            .ok_or(RegistryError::MissingBlocks)?;

        let mut registry = Self {
            defs: vec![None; 256],
            name_to_id: HashMap::new(),
            face_masks: [0; 256],
            light_levels: [0; 256],
            air: BlockDef::air(),
        };
        registry.register(BlockDef::air());

        for entry in entries {
            match RawBlock::deserialize(entry) {
                Ok(raw) => match raw.into_def() {
                    Some(def) => registry.register(def),
                    None => debug!("skipping block entry with out-of-range id"),
                },
                Err(e) => warn!("skipping malformed block entry: {e}"),
            }
        }

        registry.ensure_base_blocks();
        Ok(registry)
    }

    /// Reads and parses a JSON definitions file.
    pub fn load_json_file(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path)?;
        Self::load_json(&text)
    }

    /// Inserts or replaces the definition for `def.id`.
    pub fn register(&mut self, def: BlockDef) {
        let idx = usize::from(def.id);
        let key = normalize_name(&def.name);
        if !key.is_empty() {
            if let Some(prev) = self.name_to_id.insert(key.clone(), def.id) {
                if prev != def.id {
                    debug!("block name remap '{key}': {prev} -> {}", def.id);
                }
            }
        }
        self.face_masks[idx] = def.shape.full_face_mask();
        self.light_levels[idx] = compute_light_level(def.id, def.emission);
        self.defs[idx] = Some(def);
    }

    fn ensure_base_blocks(&mut self) {
        for def in [
            BlockDef::cube(1, "lime_block_jitter", 0, 1, 2),
            BlockDef::cube(2, "brown_block_jitter", 2, 2, 2),
            BlockDef::cube(3, "light_gray_block_jitter", 3, 3, 3),
        ] {
            if self.defs[usize::from(def.id)].is_none() {
                self.register(def);
            }
        }
    }

    fn register_builtin_extras(&mut self) {
        self.register(BlockDef::cube(4, "black_block_jitter", 4, 4, 4));
        self.register(BlockDef::cube(5, "yellow_block_jitter", 5, 5, 5));
        self.register(BlockDef::cube(6, "white_block_jitter", 6, 6, 6));

        let mut water = BlockDef::cube(7, "blue_water", 7, 7, 7).translucent();
        water.solid = false;
        water.fluid = Some(FluidDef::default());
        self.register(water);

        self.register(BlockDef::cube(8, "glass", 8, 8, 8).translucent());
        self.register(BlockDef::cube(9, "glowstone", 9, 9, 9).with_emission(1.0));
        self.register(BlockDef::cube(10, "lamp_dim", 10, 10, 10).with_emission(0.4));

        for (id, name, shape) in [
            (11, "stone_slope_xp", Shape::SlopeXp),
            (12, "stone_slope_xn", Shape::SlopeXn),
            (13, "stone_slope_zp", Shape::SlopeZp),
            (14, "stone_slope_zn", Shape::SlopeZn),
        ] {
            self.register(BlockDef::cube(id, name, 3, 3, 3).with_shape(shape));
        }
    }

    // -- lookups -------------------------------------------------------------

    /// Definition for `id`; undefined ids resolve to air.
    #[inline]
    pub fn def(&self, id: BlockId) -> &BlockDef {
        self.defs[usize::from(id)].as_ref().unwrap_or(&self.air)
    }

    /// `true` if `id` has its own definition.
    pub fn is_defined(&self, id: BlockId) -> bool {
        self.defs[usize::from(id)].is_some()
    }

    /// Name of `id` (`"air"` for undefined ids).
    pub fn name_of(&self, id: BlockId) -> &str {
        &self.def(id).name
    }

    /// Id registered under `name` (trimmed, case-insensitive), or `fallback`.
    pub fn id_by_name(&self, name: &str, fallback: BlockId) -> BlockId {
        self.name_to_id
            .get(&normalize_name(name))
            .copied()
            .unwrap_or(fallback)
    }

    /// Ids whose names match a glob with `*` and `?` wildcards. Expressions
    /// without wildcards behave like [`id_by_name`](Self::id_by_name) and
    /// yield `fallback` when unknown.
    pub fn ids_matching(&self, expr: &str, fallback: BlockId) -> Vec<BlockId> {
        let pattern = normalize_name(expr);
        if pattern.is_empty() {
            return vec![fallback];
        }
        if !pattern.contains(['*', '?']) {
            return vec![self.id_by_name(&pattern, fallback)];
        }
        self.defs
            .iter()
            .flatten()
            .filter(|d| glob_match(pattern.as_bytes(), normalize_name(&d.name).as_bytes()))
            .map(|d| d.id)
            .collect()
    }

    /// Number of defined ids, air included.
    pub fn len(&self) -> usize {
        self.defs.iter().flatten().count()
    }

    /// `true` if only air is defined.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    // -- per-id properties ---------------------------------------------------

    /// Hides neighbor faces and stops light.
    #[inline]
    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.def(id).opaque
    }

    /// Collides with entities.
    #[inline]
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.def(id).solid
    }

    /// Is a fluid.
    #[inline]
    pub fn is_fluid(&self, id: BlockId) -> bool {
        self.def(id).fluid.is_some()
    }

    /// Emission in `0.0..=1.0`.
    #[inline]
    pub fn emission(&self, id: BlockId) -> f32 {
        self.def(id).emission
    }

    /// Geometry.
    #[inline]
    pub fn shape(&self, id: BlockId) -> Shape {
        self.def(id).shape
    }

    /// Render queue.
    #[inline]
    pub fn render_layer(&self, id: BlockId) -> RenderLayer {
        self.def(id).render_layer
    }

    /// Full cube shape.
    #[inline]
    pub fn is_cube(&self, id: BlockId) -> bool {
        self.shape(id) == Shape::Cube
    }

    /// One of the four ramps.
    #[inline]
    pub fn is_slope(&self, id: BlockId) -> bool {
        self.shape(id).is_slope()
    }

    /// Opaque cube on the opaque layer: the only blocks the greedy pass merges.
    #[inline]
    pub fn is_opaque_cube(&self, id: BlockId) -> bool {
        let d = self.def(id);
        d.shape == Shape::Cube && d.opaque && d.render_layer == RenderLayer::Opaque
    }

    /// On the alpha layer.
    #[inline]
    pub fn is_alpha(&self, id: BlockId) -> bool {
        self.render_layer(id) == RenderLayer::Alpha
    }

    /// Opaque and on the opaque layer; only such blocks hide neighbor faces.
    #[inline]
    pub fn is_occluder_opaque_layer(&self, id: BlockId) -> bool {
        let d = self.def(id);
        d.opaque && d.render_layer == RenderLayer::Opaque
    }

    /// Tile for a face: +Y uses the top tile, -Y the bottom, X/Z the side.
    #[inline]
    pub fn tile_for(&self, id: BlockId, axis: usize, positive: bool) -> u16 {
        let d = self.def(id);
        match (axis, positive) {
            (1, true) => d.tile_top,
            (1, false) => d.tile_bottom,
            _ => d.tile_side,
        }
    }

    /// `true` if `id` fully covers its face on `axis` in the given direction.
    #[inline]
    pub fn blocks_full_face(&self, id: BlockId, axis: usize, positive_face: bool) -> bool {
        axis < 3 && self.face_masks[usize::from(id)] & face_bit(axis, positive_face) != 0
    }

    /// Emitted light level in `0..=MAX_LIGHT`; air never emits.
    #[inline]
    pub fn light_level(&self, id: BlockId) -> u8 {
        self.light_levels[usize::from(id)]
    }

    /// `true` if the block emits any light.
    #[inline]
    pub fn is_light_source(&self, id: BlockId) -> bool {
        self.light_level(id) > 0
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_light_level(id: BlockId, emission: f32) -> u8 {
    if id == AIR || !emission.is_finite() {
        return 0;
    }
    let level = (emission * f32::from(MAX_LIGHT) + 0.999) as i32;
    level.clamp(0, i32::from(MAX_LIGHT)) as u8
}

/// Matches `text` against a glob with `*` (any run) and `?` (one byte).
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.name_of(AIR), "air");
        assert_eq!(registry.shape(AIR), Shape::Air);
        assert!(!registry.is_opaque(AIR));
        assert_eq!(registry.render_layer(AIR), RenderLayer::None);
    }

    #[test]
    fn test_base_blocks_present() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.id_by_name("lime_block_jitter", 0), 1);
        assert_eq!(registry.id_by_name("  Brown_Block_Jitter ", 0), 2);
        assert_eq!(registry.id_by_name("light_gray_block_jitter", 0), 3);
        assert_eq!(registry.def(1).tile_top, 0);
        assert_eq!(registry.def(1).tile_side, 1);
        assert_eq!(registry.def(1).tile_bottom, 2);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_undefined_id_behaves_as_air() {
        let registry = BlockRegistry::new();
        assert!(!registry.is_defined(200));
        assert_eq!(registry.name_of(200), "air");
        assert!(!registry.is_opaque_cube(200));
        assert!(!registry.blocks_full_face(200, 0, true));
    }

    #[test]
    fn test_defaults_contain_water_glass_and_lights() {
        let registry = BlockRegistry::with_defaults();
        let water = registry.id_by_name("blue_water", 0);
        assert!(registry.is_fluid(water));
        assert!(registry.is_alpha(water));
        assert!(!registry.is_solid(water));
        assert!(!registry.is_opaque(water));

        let glass = registry.id_by_name("glass", 0);
        assert!(registry.is_alpha(glass));
        assert!(!registry.is_occluder_opaque_layer(glass));

        assert_eq!(registry.light_level(registry.id_by_name("glowstone", 0)), 7);
        assert_eq!(registry.light_level(registry.id_by_name("lamp_dim", 0)), 3);
    }

    #[test]
    fn test_full_face_rules() {
        let registry = BlockRegistry::with_defaults();
        for axis in 0..3 {
            assert!(registry.blocks_full_face(1, axis, true));
            assert!(registry.blocks_full_face(1, axis, false));
        }

        let xp = registry.id_by_name("stone_slope_xp", 0);
        assert!(registry.blocks_full_face(xp, 1, false));
        assert!(registry.blocks_full_face(xp, 0, false));
        assert!(!registry.blocks_full_face(xp, 0, true));
        assert!(!registry.blocks_full_face(xp, 1, true));

        let xn = registry.id_by_name("stone_slope_xn", 0);
        assert!(registry.blocks_full_face(xn, 0, true));
        assert!(!registry.blocks_full_face(xn, 0, false));

        let zp = registry.id_by_name("stone_slope_zp", 0);
        assert!(registry.blocks_full_face(zp, 2, true));
        assert!(!registry.blocks_full_face(zp, 2, false));

        let zn = registry.id_by_name("stone_slope_zn", 0);
        assert!(registry.blocks_full_face(zn, 2, false));
        assert!(!registry.blocks_full_face(zn, 2, true));
        assert!(registry.is_slope(zn));
        assert!(!registry.is_opaque_cube(zn));
    }

    #[test]
    fn test_tile_for_axis() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.tile_for(1, 1, true), 0);
        assert_eq!(registry.tile_for(1, 1, false), 2);
        assert_eq!(registry.tile_for(1, 0, true), 1);
        assert_eq!(registry.tile_for(1, 2, false), 1);
    }

    #[test]
    fn test_light_level_rounds_up() {
        assert_eq!(compute_light_level(5, 0.0), 0);
        assert_eq!(compute_light_level(5, 0.01), 1);
        assert_eq!(compute_light_level(5, 0.5), 4);
        assert_eq!(compute_light_level(5, 3.0), 7);
        assert_eq!(compute_light_level(AIR, 1.0), 0);
        assert_eq!(compute_light_level(5, -1.0), 0);
    }

    #[test]
    fn test_load_json_defaults_and_cascades() {
        let json = r#"{
            "blocks": [
                { "id": 20, "name": "marble", "tiles": { "top": 9 } },
                { "id": 21, "name": "pane", "opaque": false, "renderLayer": "alpha", "tileTop": 4, "tileSide": 5 },
                { "id": 22, "name": "pool", "fluid": { "type": "Water", "drag": 2.0 }, "shape": "blob" },
                { "id": 300, "name": "too_big" },
                { "name": "no_id" }
            ]
        }"#;
        let registry = BlockRegistry::load_json(json).unwrap();

        let marble = registry.def(20);
        assert!(marble.opaque && marble.solid);
        assert_eq!((marble.tile_top, marble.tile_side, marble.tile_bottom), (9, 9, 9));

        let pane = registry.def(21);
        assert_eq!(pane.render_layer, RenderLayer::Alpha);
        assert_eq!((pane.tile_top, pane.tile_side, pane.tile_bottom), (4, 5, 5));

        let pool = registry.def(22);
        assert!(!pool.solid, "water fluid is never solid");
        assert_eq!(pool.shape, Shape::Cube);
        assert_eq!(pool.fluid.unwrap().drag, 2.0);
        assert_eq!(pool.fluid.unwrap().move_scale, 0.60);

        assert_eq!(registry.id_by_name("too_big", 0), 0);
        // base blocks are filled in
        assert_eq!(registry.id_by_name("lime_block_jitter", 0), 1);
    }

    #[test]
    fn test_load_json_requires_blocks_array() {
        assert!(matches!(
            BlockRegistry::load_json(r#"{"things": []}"#),
            Err(RegistryError::MissingBlocks)
        ));
        assert!(matches!(
            BlockRegistry::load_json("nope"),
            Err(RegistryError::Json(_))
        ));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.json");
        std::fs::write(&path, r#"{"blocks":[{"id":1,"name":"moss","tiles":{"top":7}}]}"#).unwrap();
        let registry = BlockRegistry::load_json_file(&path).unwrap();
        assert_eq!(registry.name_of(1), "moss");
        assert_eq!(registry.id_by_name("lime_block_jitter", 0), 0);
    }

    #[test]
    fn test_ids_matching_glob() {
        let registry = BlockRegistry::with_defaults();
        let mut jitters = registry.ids_matching("*_BLOCK_JITTER", 0);
        jitters.sort_unstable();
        assert_eq!(jitters, vec![1, 2, 3, 4, 5, 6]);

        let slopes = registry.ids_matching("stone_slope_?p", 0);
        assert_eq!(slopes.len(), 2);

        assert_eq!(registry.ids_matching("glass", 0), vec![8]);
        assert_eq!(registry.ids_matching("missing", 3), vec![3]);
        assert!(registry.ids_matching("zz*", 0).is_empty());
    }

    #[test]
    fn test_glob_match_cases() {
        assert!(glob_match(b"a*c", b"abbbc"));
        assert!(glob_match(b"a**", b"a"));
        assert!(glob_match(b"?b", b"ab"));
        assert!(!glob_match(b"?b", b"b"));
        assert!(!glob_match(b"a*d", b"abc"));
    }
}
