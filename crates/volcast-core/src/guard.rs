//! Scoped guards over ambient backend state.
//!
//! Both guards undo what they changed when dropped, on success and on early
//! `?` returns alike.

use std::ops::{Deref, DerefMut};

use crate::backend::{GpuBackend, RasterState};
use crate::error::Result;

/// Saves the raster state on creation and restores it exactly on drop.
pub struct RasterStateGuard<'a, B: GpuBackend> {
    backend: &'a mut B,
    saved: RasterState,
}

impl<'a, B: GpuBackend> RasterStateGuard<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        let saved = backend.raster_state();
        Self { backend, saved }
    }

    /// The state that will be restored.
    pub fn saved(&self) -> RasterState {
        self.saved
    }
}

impl<B: GpuBackend> Deref for RasterStateGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: GpuBackend> DerefMut for RasterStateGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: GpuBackend> Drop for RasterStateGuard<'_, B> {
    fn drop(&mut self) {
        self.backend.set_raster_state(self.saved);
    }
}

/// Tracks texture units, image slots and draw buffers touched during a pass
/// and resets them on drop.
pub struct BindingScope<'a, B: GpuBackend> {
    backend: &'a mut B,
    units: Vec<u32>,
    images: Vec<u32>,
    draw_buffers_changed: bool,
}

impl<'a, B: GpuBackend> BindingScope<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            units: Vec::new(),
            images: Vec::new(),
            draw_buffers_changed: false,
        }
    }

    pub fn texture(&mut self, unit: u32, texture: &B::Texture) {
        self.backend.bind_texture(unit, Some(texture));
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    pub fn image(&mut self, slot: u32, texture: &B::Texture) {
        self.backend.bind_image(slot, Some(texture));
        if !self.images.contains(&slot) {
            self.images.push(slot);
        }
    }

    /// Requests `count` color outputs; reset to one on drop.
    pub fn draw_buffers(&mut self, count: u32) {
        self.backend.set_draw_buffers(count);
        self.draw_buffers_changed = true;
    }

    pub fn dispatch(&mut self, program: &B::Program, groups: [u32; 3]) -> Result<()> {
        self.backend.dispatch(program, groups)
    }

    pub fn draw(&mut self, program: &B::Program, vertex_count: u32) -> Result<()> {
        self.backend.draw_fullscreen(program, vertex_count)
    }
}

impl<B: GpuBackend> Drop for BindingScope<'_, B> {
    fn drop(&mut self) {
        for slot in self.images.drain(..).rev() {
            self.backend.bind_image(slot, None);
        }
        for unit in self.units.drain(..).rev() {
            self.backend.bind_texture(unit, None);
        }
        if self.draw_buffers_changed {
            self.backend.set_draw_buffers(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BlendFactor, BlendFunc, ProgramId};
    use crate::test_helpers::{Command, RecordingBackend};

    #[test]
    fn test_raster_state_restored() {
        let mut backend = RecordingBackend::new();
        let initial = RasterState {
            blend_enabled: true,
            blend_func: BlendFunc {
                src_rgb: BlendFactor::One,
                dst_rgb: BlendFactor::OneMinusSrcAlpha,
                src_alpha: BlendFactor::DstAlpha,
                dst_alpha: BlendFactor::Zero,
            },
            depth_test: false,
        };
        backend.set_raster_state(initial);
        {
            let mut guard = RasterStateGuard::new(&mut backend);
            assert_eq!(guard.saved(), initial);
            guard.set_raster_state(RasterState::default());
            assert_eq!(guard.raster_state(), RasterState::default());
        }
        assert_eq!(backend.raster_state(), initial);
    }

    #[test]
    fn test_bindings_reset_on_error() {
        let mut backend = RecordingBackend::new();
        backend.fail_dispatch = true;
        let program = backend.compile_program(ProgramId::RaycastIntegration).unwrap();
        let texture = backend.create_lookup_texture(&[[0; 4]; 2]).unwrap();

        let result = {
            let mut scope = BindingScope::new(&mut backend);
            scope.texture(0, &texture);
            scope.texture(1, &texture);
            scope.image(0, &texture);
            scope.dispatch(&program, [1, 1, 1])
        };
        assert!(result.is_err());
        assert!(backend.bound_textures().is_empty());
        assert!(backend.bound_images().is_empty());
        assert!(backend
            .commands
            .ends_with(&[Command::BindTexture { unit: 0, texture: None }]));
    }

    #[test]
    fn test_draw_buffers_reset() {
        let mut backend = RecordingBackend::new();
        {
            let mut scope = BindingScope::new(&mut backend);
            scope.draw_buffers(2);
            assert_eq!(backend_draw_buffers(&scope), 2);
        }
        assert_eq!(backend.draw_buffers(), 1);
    }

    fn backend_draw_buffers(scope: &BindingScope<'_, RecordingBackend>) -> u32 {
        scope.backend.draw_buffers()
    }
}
