//! A [`GpuBackend`] that records every command instead of touching a GPU.

use std::collections::{BTreeMap, HashMap};

use crate::backend::{GpuBackend, ProgramId, RasterState, TargetKind, UniformValue};
use crate::error::{RaycastError, Result};
use crate::metadata::VolumeFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Compile(ProgramId),
    CreateVolume {
        format: VolumeFormat,
        resolution: [u32; 3],
    },
    CreateTarget {
        kind: TargetKind,
        width: u32,
        height: u32,
    },
    CreateLookup {
        texels: usize,
    },
    CreateSnapshot {
        width: u32,
        height: u32,
    },
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    BindTexture {
        unit: u32,
        texture: Option<TextureHandle>,
    },
    BindImage {
        slot: u32,
        texture: Option<TextureHandle>,
    },
    Dispatch {
        program: ProgramId,
        groups: [u32; 3],
    },
    MemoryBarrier,
    ReadRgba(TextureHandle),
    SetRasterState(RasterState),
    SetDrawBuffers(u32),
    Draw {
        program: ProgramId,
        vertex_count: u32,
        state: RasterState,
        draw_buffers: u32,
    },
}

#[derive(Debug)]
pub struct RecordingProgram {
    pub id: ProgramId,
    pub uniforms: HashMap<String, UniformValue>,
}

#[derive(Debug)]
pub struct RecordingSnapshot {
    pub color: TextureHandle,
    pub depth: TextureHandle,
}

/// Bindings observed when a dispatch or draw was issued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSnapshot {
    pub textures: BTreeMap<u32, TextureHandle>,
    pub images: BTreeMap<u32, TextureHandle>,
    pub uniforms: Vec<String>,
}

const COMPUTE_UNIFORMS: &[&str] = &[
    "view_mx",
    "proj_mx",
    "inv_view_mx",
    "inv_proj_mx",
    "box_min",
    "voxel_size",
    "box_max",
    "ray_step_ratio",
    "half_voxel_size",
    "use_lighting",
    "light",
    "ka",
    "ambient_col",
    "kd",
    "specular_col",
    "ks",
    "light_col",
    "shininess",
    "material_col",
    "background",
    "rt_resolution",
    "val_range",
];

/// Uniforms each program declares, mirroring the WGSL sources.
pub fn declared_uniforms(id: ProgramId) -> Vec<&'static str> {
    let tail: &[&str] = match id {
        ProgramId::RaycastIntegration => &["opacity_threshold", "use_depth_tx"],
        ProgramId::RaycastIsosurface => &["iso_value", "opacity"],
        ProgramId::RaycastAggregate => &["use_depth_tx"],
        ProgramId::Composite => return Vec::new(),
        ProgramId::CompositeAggregate => return vec!["val_range"],
    };
    COMPUTE_UNIFORMS.iter().chain(tail).copied().collect()
}

pub struct RecordingBackend {
    pub commands: Vec<Command>,
    pub fail_compile: Option<ProgramId>,
    pub fail_dispatch: bool,
    pub fail_draw: bool,
    /// Texels returned by `read_rgba`; zeros of the target size when unset.
    pub readback: Option<Vec<f32>>,
    pub dispatches: Vec<BindingSnapshot>,
    pub draws: Vec<BindingSnapshot>,
    next_texture: u32,
    sizes: HashMap<TextureHandle, (u32, u32)>,
    textures: BTreeMap<u32, TextureHandle>,
    images: BTreeMap<u32, TextureHandle>,
    state: RasterState,
    draw_buffers: u32,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            fail_compile: None,
            fail_dispatch: false,
            fail_draw: false,
            readback: None,
            dispatches: Vec::new(),
            draws: Vec::new(),
            next_texture: 1,
            sizes: HashMap::new(),
            textures: BTreeMap::new(),
            images: BTreeMap::new(),
            state: RasterState::default(),
            draw_buffers: 1,
        }
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound_textures(&self) -> &BTreeMap<u32, TextureHandle> {
        &self.textures
    }

    pub fn bound_images(&self) -> &BTreeMap<u32, TextureHandle> {
        &self.images
    }

    pub fn draw_buffers(&self) -> u32 {
        self.draw_buffers
    }

    /// Names of all uniforms set on `program` so far.
    pub fn uniforms_set(&self, program: ProgramId) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { program: p, name, .. } if *p == program => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The last value written to uniform `name` of `program`.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::SetUniform {
                program: p,
                name: n,
                value,
            } if *p == program && n == name => Some(*value),
            _ => None,
        })
    }

    fn alloc(&mut self, width: u32, height: u32) -> TextureHandle {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.sizes.insert(handle, (width, height));
        handle
    }

    fn observed(&self, program: &RecordingProgram) -> BindingSnapshot {
        let mut uniforms: Vec<String> = program.uniforms.keys().cloned().collect();
        uniforms.sort();
        BindingSnapshot {
            textures: self.textures.clone(),
            images: self.images.clone(),
            uniforms,
        }
    }
}

impl GpuBackend for RecordingBackend {
    type Program = RecordingProgram;
    type Texture = TextureHandle;
    type Snapshot = RecordingSnapshot;

    fn compile_program(&mut self, id: ProgramId) -> Result<RecordingProgram> {
        self.commands.push(Command::Compile(id));
        if self.fail_compile == Some(id) {
            return Err(RaycastError::ResourceCreation(format!(
                "{} failed to link",
                id.source_name()
            )));
        }
        Ok(RecordingProgram {
            id,
            uniforms: HashMap::new(),
        })
    }

    fn create_volume_texture(
        &mut self,
        format: VolumeFormat,
        resolution: [u32; 3],
        _data: &[u8],
    ) -> Result<TextureHandle> {
        self.commands.push(Command::CreateVolume { format, resolution });
        Ok(self.alloc(resolution[0], resolution[1]))
    }

    fn create_target(&mut self, kind: TargetKind, width: u32, height: u32) -> Result<TextureHandle> {
        self.commands.push(Command::CreateTarget {
            kind,
            width,
            height,
        });
        Ok(self.alloc(width, height))
    }

    fn create_lookup_texture(&mut self, texels: &[[u8; 4]]) -> Result<TextureHandle> {
        self.commands.push(Command::CreateLookup {
            texels: texels.len(),
        });
        #[allow(clippy::cast_possible_truncation)]
        let width = texels.len() as u32;
        Ok(self.alloc(width, 1))
    }

    fn create_snapshot(&mut self, width: u32, height: u32) -> Result<RecordingSnapshot> {
        self.commands.push(Command::CreateSnapshot { width, height });
        Ok(RecordingSnapshot {
            color: self.alloc(width, height),
            depth: self.alloc(width, height),
        })
    }

    fn snapshot_color(&self, snapshot: &RecordingSnapshot) -> TextureHandle {
        snapshot.color
    }

    fn snapshot_depth(&self, snapshot: &RecordingSnapshot) -> TextureHandle {
        snapshot.depth
    }

    fn set_uniform(
        &mut self,
        program: &mut RecordingProgram,
        name: &str,
        value: UniformValue,
    ) -> Result<()> {
        if !declared_uniforms(program.id).contains(&name) {
            return Err(RaycastError::MissingShaderParameter(name.to_string()));
        }
        program.uniforms.insert(name.to_string(), value);
        self.commands.push(Command::SetUniform {
            program: program.id,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<&TextureHandle>) {
        match texture {
            Some(t) => self.textures.insert(unit, *t),
            None => self.textures.remove(&unit),
        };
        self.commands.push(Command::BindTexture {
            unit,
            texture: texture.copied(),
        });
    }

    fn bind_image(&mut self, slot: u32, texture: Option<&TextureHandle>) {
        match texture {
            Some(t) => self.images.insert(slot, *t),
            None => self.images.remove(&slot),
        };
        self.commands.push(Command::BindImage {
            slot,
            texture: texture.copied(),
        });
    }

    fn dispatch(&mut self, program: &RecordingProgram, groups: [u32; 3]) -> Result<()> {
        self.commands.push(Command::Dispatch {
            program: program.id,
            groups,
        });
        if self.fail_dispatch {
            return Err(RaycastError::ResourceCreation("dispatch rejected".into()));
        }
        let observed = self.observed(program);
        self.dispatches.push(observed);
        Ok(())
    }

    fn memory_barrier(&mut self) {
        self.commands.push(Command::MemoryBarrier);
    }

    fn read_rgba(&mut self, texture: &TextureHandle) -> Result<Vec<f32>> {
        self.commands.push(Command::ReadRgba(*texture));
        if let Some(data) = &self.readback {
            return Ok(data.clone());
        }
        let (w, h) = self
            .sizes
            .get(texture)
            .copied()
            .ok_or_else(|| RaycastError::Readback(format!("unknown texture {texture:?}")))?;
        Ok(vec![0.0; (w * h * 4) as usize])
    }

    fn raster_state(&self) -> RasterState {
        self.state
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.state = state;
        self.commands.push(Command::SetRasterState(state));
    }

    fn set_draw_buffers(&mut self, count: u32) {
        self.draw_buffers = count;
        self.commands.push(Command::SetDrawBuffers(count));
    }

    fn draw_fullscreen(&mut self, program: &RecordingProgram, vertex_count: u32) -> Result<()> {
        self.commands.push(Command::Draw {
            program: program.id,
            vertex_count,
            state: self.state,
            draw_buffers: self.draw_buffers,
        });
        if self.fail_draw {
            return Err(RaycastError::ResourceCreation("draw rejected".into()));
        }
        let observed = self.observed(program);
        self.draws.push(observed);
        Ok(())
    }
}
