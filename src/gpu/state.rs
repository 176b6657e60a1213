//! Blend modes and the local mirror of driver state.

use std::fmt;
use std::str::FromStr;

use glam::Vec4;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gpu::driver::{ProgramId, TextureId};

/// Number of texture units the cache tracks.
pub const TEXTURE_UNITS: usize = 16;

/// How drawn fragments combine with the framebuffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Alpha compositing.
    #[default]
    Blend,
    /// Additive.
    Add,
    /// Per-channel minimum.
    Min,
    /// Per-channel maximum.
    Max,
    /// Overwrite the destination.
    Copy,
}

impl BlendMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 5] = [Self::Blend, Self::Add, Self::Min, Self::Max, Self::Copy];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blend => "blend",
            Self::Add => "add",
            Self::Min => "min",
            Self::Max => "max",
            Self::Copy => "copy",
        }
    }

    /// Whether the mode needs the min/max blend equations.
    #[must_use]
    pub const fn needs_min_max(self) -> bool {
        matches!(self, Self::Min | Self::Max)
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| ConfigError::UnknownBlendMode(s.to_owned()))
    }
}

/// Blend mode plus the alpha convention of the incoming colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Combination rule.
    pub mode: BlendMode,
    /// Source colour is already multiplied by its alpha.
    pub premultiplied: bool,
}

impl BlendState {
    /// Blend state with the given mode and alpha convention.
    #[must_use]
    pub const fn new(mode: BlendMode, premultiplied: bool) -> Self {
        Self {
            mode,
            premultiplied,
        }
    }

    /// Equivalent wgpu blend state; `None` means the fragment replaces the
    /// destination.
    #[must_use]
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        use wgpu::{BlendComponent, BlendFactor, BlendOperation};

        let src = if self.premultiplied {
            BlendFactor::One
        } else {
            BlendFactor::SrcAlpha
        };
        let over = |dst| BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation: BlendOperation::Add,
        };
        let extreme = |operation| BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation,
        };
        match self.mode {
            BlendMode::Blend => Some(wgpu::BlendState {
                color: over(BlendFactor::OneMinusSrcAlpha),
                alpha: BlendComponent {
                    src_factor: BlendFactor::One,
                    dst_factor: BlendFactor::OneMinusSrcAlpha,
                    operation: BlendOperation::Add,
                },
            }),
            BlendMode::Add => Some(wgpu::BlendState {
                color: over(BlendFactor::One),
                alpha: extreme(BlendOperation::Add),
            }),
            BlendMode::Min => Some(wgpu::BlendState {
                color: extreme(BlendOperation::Min),
                alpha: extreme(BlendOperation::Min),
            }),
            BlendMode::Max => Some(wgpu::BlendState {
                color: extreme(BlendOperation::Max),
                alpha: extreme(BlendOperation::Max),
            }),
            BlendMode::Copy => None,
        }
    }
}

/// What the driver was last told.
///
/// Every setter takes the driver call as a closure, skips it when the cached
/// value already matches and records the new value only after the call
/// succeeded. A fresh cache knows nothing, so the first call of each kind
/// always reaches the driver.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    blend: Option<BlendState>,
    blend_color: Option<Vec4>,
    textures: [Option<TextureId>; TEXTURE_UNITS],
    bound: [bool; TEXTURE_UNITS],
    program: Option<Option<ProgramId>>,
}

impl StateCache {
    /// Last blend state the driver accepted.
    #[must_use]
    pub const fn blend(&self) -> Option<BlendState> {
        self.blend
    }

    /// Last blend colour the driver accepted.
    #[must_use]
    pub const fn blend_color(&self) -> Option<Vec4> {
        self.blend_color
    }

    /// Texture last bound to `unit`.
    ///
    /// # Panics
    ///
    /// If `unit >= TEXTURE_UNITS`.
    #[must_use]
    pub fn texture(&self, unit: usize) -> Option<TextureId> {
        assert!(unit < TEXTURE_UNITS, "texture unit {unit} out of range");
        self.textures[unit]
    }

    /// Program last made current, `None` if nothing was recorded yet.
    #[must_use]
    pub const fn program(&self) -> Option<Option<ProgramId>> {
        self.program
    }

    /// Apply `state` through `issue` unless it is already current.
    ///
    /// Returns whether the driver was called.
    ///
    /// # Errors
    ///
    /// Whatever `issue` returns; the cache is left untouched.
    pub fn set_blend<E>(
        &mut self,
        state: BlendState,
        issue: impl FnOnce(BlendState) -> Result<(), E>,
    ) -> Result<bool, E> {
        if self.blend == Some(state) {
            return Ok(false);
        }
        issue(state)?;
        self.blend = Some(state);
        Ok(true)
    }

    /// Apply a blend colour through `issue` unless it is already current.
    ///
    /// # Errors
    ///
    /// Whatever `issue` returns; the cache is left untouched.
    pub fn set_blend_color<E>(
        &mut self,
        color: Vec4,
        issue: impl FnOnce(Vec4) -> Result<(), E>,
    ) -> Result<bool, E> {
        if self.blend_color == Some(color) {
            return Ok(false);
        }
        issue(color)?;
        self.blend_color = Some(color);
        Ok(true)
    }

    /// Bind `texture` to `unit` through `issue` unless already bound.
    ///
    /// # Errors
    ///
    /// Whatever `issue` returns; the cache is left untouched.
    ///
    /// # Panics
    ///
    /// If `unit >= TEXTURE_UNITS`.
    pub fn bind_texture<E>(
        &mut self,
        unit: usize,
        texture: Option<TextureId>,
        issue: impl FnOnce(usize, Option<TextureId>) -> Result<(), E>,
    ) -> Result<bool, E> {
        assert!(unit < TEXTURE_UNITS, "texture unit {unit} out of range");
        if self.bound[unit] && self.textures[unit] == texture {
            return Ok(false);
        }
        issue(unit, texture)?;
        self.textures[unit] = texture;
        self.bound[unit] = true;
        Ok(true)
    }

    /// Make `program` current through `issue` unless it already is.
    ///
    /// # Errors
    ///
    /// Whatever `issue` returns; the cache is left untouched.
    pub fn use_program<E>(
        &mut self,
        program: Option<ProgramId>,
        issue: impl FnOnce(Option<ProgramId>) -> Result<(), E>,
    ) -> Result<bool, E> {
        if self.program == Some(program) {
            return Ok(false);
        }
        issue(program)?;
        self.program = Some(program);
        Ok(true)
    }

    /// Forget a deleted texture wherever it is bound.
    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.textures {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    /// Forget a deleted program if it is current.
    pub fn forget_program(&mut self, program: ProgramId) {
        if self.program == Some(Some(program)) {
            self.program = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_blend_state_skips_driver() {
        let mut cache = StateCache::default();
        let mut calls = 0;
        let state = BlendState::new(BlendMode::Add, false);
        for _ in 0..3 {
            let _ = cache
                .set_blend(state, |_| {
                    calls += 1;
                    Ok::<_, ()>(())
                })
                .unwrap();
        }
        assert_eq!(calls, 1);

        let premul = BlendState::new(BlendMode::Add, true);
        assert!(cache.set_blend(premul, |_| Ok::<_, ()>(())).unwrap());
        assert_eq!(cache.blend(), Some(premul));
    }

    #[test]
    fn failed_call_leaves_cache_untouched() {
        let mut cache = StateCache::default();
        let blend = BlendState::new(BlendMode::Blend, false);
        let _ = cache.set_blend(blend, |_| Ok::<_, ()>(())).unwrap();
        let result = cache.set_blend(BlendState::new(BlendMode::Max, false), |_| Err("nope"));
        assert!(result.is_err());
        assert_eq!(cache.blend(), Some(blend));

        assert!(cache.bind_texture(3, Some(TextureId::from_raw(7)), |_, _| Err(())).is_err());
        assert_eq!(cache.texture(3), None);
    }

    #[test]
    fn unbinding_a_never_bound_unit_still_reaches_driver() {
        let mut cache = StateCache::default();
        assert!(cache.bind_texture(1, None, |_, _| Ok::<_, ()>(())).unwrap());
        assert!(!cache.bind_texture(1, None, |_, _| Ok::<_, ()>(())).unwrap());
    }

    #[test]
    fn forgetting_a_texture_clears_its_units() {
        let mut cache = StateCache::default();
        let tex = TextureId::from_raw(4);
        let _ = cache.bind_texture(0, Some(tex), |_, _| Ok::<_, ()>(())).unwrap();
        let _ = cache.bind_texture(2, Some(tex), |_, _| Ok::<_, ()>(())).unwrap();
        cache.forget_texture(tex);
        assert_eq!(cache.texture(0), None);
        assert_eq!(cache.texture(2), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn unit_sixteen_is_a_contract_violation() {
        let mut cache = StateCache::default();
        let _ = cache.bind_texture(TEXTURE_UNITS, None, |_, _| Ok::<_, ()>(()));
    }

    #[test]
    fn blend_mode_names_round_trip() {
        for mode in BlendMode::ALL {
            assert_eq!(mode.to_string().parse::<BlendMode>().unwrap(), mode);
        }
        assert_eq!(
            "screen".parse::<BlendMode>(),
            Err(ConfigError::UnknownBlendMode("screen".to_owned()))
        );
    }

    #[test]
    fn copy_disables_blending() {
        assert!(BlendState::new(BlendMode::Copy, false).to_wgpu().is_none());
        let max = BlendState::new(BlendMode::Max, false).to_wgpu().unwrap();
        assert_eq!(max.color.operation, wgpu::BlendOperation::Max);
        let premul = BlendState::new(BlendMode::Blend, true).to_wgpu().unwrap();
        assert_eq!(premul.color.src_factor, wgpu::BlendFactor::One);
    }
}
