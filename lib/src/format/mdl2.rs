use std::io::{Cursor, Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};
use glam::Mat4;
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::{CMatrix4f, SizedString},
    util::stream::{
        align_reader, align_up, align_writer, pad_to, read_value, read_value_args, read_values,
        remaining, skip_padding, unwrap_capacity_error, write_value, write_value_args,
        BoundedWriter,
    },
};

/// Model flag marking shell (fur/grass) geometry.
pub const SHELL_FLAG: u32 = 885;
/// Parent index of a root bone.
pub const NO_PARENT: u8 = 255;
/// Triangle indices are `u16`.
pub const MAX_VERTICES: usize = u16::MAX as usize;
/// Upper bound for both UV and vertex color layers.
pub const MAX_LAYERS: u16 = 4;

pub const HEADER_SIZE: u64 = 28;
const TABLE_ALIGN: u64 = 4;
const BUFFER_ALIGN: u64 = 16;
const MATRIX_SIZE: u64 = 64;

#[binrw]
#[brw(magic = b"MDL2")]
#[derive(Clone, Debug, Default)]
pub struct Mdl2Header {
    pub version: u32,
    pub bone_count: u32,
    pub model_count: u32,
    pub pack_offset: f32,
    // relative to the start of the file
    pub buffer_offset: u32,
    pub buffer_size: u32,
}

#[binrw]
#[derive(Clone, Debug)]
pub struct ModelInfo {
    pub flag: u32,
    pub lod_index: u32,
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub material: String,
    pub uv_layer_count: u16,
    pub color_layer_count: u16,
    pub vertex_count: u32,
    pub index_count: u32,
    // relative to buffer_offset
    pub vertex_offset: u32,
    pub index_offset: u32,
}

impl ModelInfo {
    fn encoded_len(&self) -> u64 { 28 + SizedString::encoded_len(&self.material) as u64 }
}

/// Describes which optional fields a model's packed vertices carry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub uv_layers: u16,
    pub color_layers: u16,
    pub shell: bool,
}

impl VertexLayout {
    /// Size of one packed vertex in bytes.
    pub fn stride(&self) -> u64 {
        // position, normal, tangent
        let mut size = 36;
        size += 8 * self.uv_layers as u64;
        size += 4 * self.color_layers as u64;
        // bone ids, weights, bone index, unk_0
        size += 4 + 16 + 2;
        if self.shell {
            size += 4;
        }
        size
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub bone_ids: [u8; 4],
    pub weights: [f32; 4],
    /// Primary bone, used for skin partitioning.
    pub bone_index: u8,
    pub unk_0: u8,
    pub fur_length: Option<f32>,
}

impl PackedVertex {
    fn matches(&self, layout: VertexLayout) -> bool {
        self.uvs.len() == layout.uv_layers as usize
            && self.colors.len() == layout.color_layers as usize
            && self.fur_length.is_some() == layout.shell
    }
}

impl BinRead for PackedVertex {
    type Args<'a> = VertexLayout;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        layout: Self::Args<'_>,
    ) -> BinResult<Self> {
        let position = <[f32; 3]>::read_options(reader, endian, ())?;
        let normal = <[f32; 3]>::read_options(reader, endian, ())?;
        let tangent = <[f32; 3]>::read_options(reader, endian, ())?;
        let mut uvs = Vec::with_capacity(layout.uv_layers as usize);
        for _ in 0..layout.uv_layers {
            uvs.push(<[f32; 2]>::read_options(reader, endian, ())?);
        }
        let mut colors = Vec::with_capacity(layout.color_layers as usize);
        for _ in 0..layout.color_layers {
            colors.push(<[u8; 4]>::read_options(reader, endian, ())?);
        }
        let bone_ids = <[u8; 4]>::read_options(reader, endian, ())?;
        let weights = <[f32; 4]>::read_options(reader, endian, ())?;
        let bone_index = u8::read_options(reader, endian, ())?;
        let unk_0 = u8::read_options(reader, endian, ())?;
        let fur_length =
            if layout.shell { Some(f32::read_options(reader, endian, ())?) } else { None };
        Ok(Self {
            position,
            normal,
            tangent,
            uvs,
            colors,
            bone_ids,
            weights,
            bone_index,
            unk_0,
            fur_length,
        })
    }
}

impl BinWrite for PackedVertex {
    type Args<'a> = VertexLayout;

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        layout: Self::Args<'_>,
    ) -> BinResult<()> {
        if !self.matches(layout) {
            return Err(binrw::Error::AssertFail {
                pos: writer.stream_position()?,
                message: format!("Vertex does not match layout {layout:?}"),
            });
        }
        self.position.write_options(writer, endian, ())?;
        self.normal.write_options(writer, endian, ())?;
        self.tangent.write_options(writer, endian, ())?;
        for uv in &self.uvs {
            uv.write_options(writer, endian, ())?;
        }
        for color in &self.colors {
            color.write_options(writer, endian, ())?;
        }
        self.bone_ids.write_options(writer, endian, ())?;
        self.weights.write_options(writer, endian, ())?;
        self.bone_index.write_options(writer, endian, ())?;
        self.unk_0.write_options(writer, endian, ())?;
        if let Some(fur_length) = self.fur_length {
            fur_length.write_options(writer, endian, ())?;
        }
        Ok(())
    }
}

/// One LOD mesh of the container.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelRecord {
    pub flag: u32,
    pub lod_index: u32,
    pub material: String,
    pub uv_layer_count: u16,
    pub color_layer_count: u16,
    /// Empty after a quick read.
    pub vertices: Vec<PackedVertex>,
    /// Empty after a quick read.
    pub tris: Vec<[u16; 3]>,
    vertex_count: usize,
    tri_count: usize,
}

impl ModelRecord {
    pub fn new(
        flag: u32,
        lod_index: u32,
        material: impl Into<String>,
        uv_layer_count: u16,
        color_layer_count: u16,
    ) -> Self {
        Self {
            flag,
            lod_index,
            material: material.into(),
            uv_layer_count,
            color_layer_count,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_shell(&self) -> bool { self.flag == SHELL_FLAG }

    pub fn layout(&self) -> VertexLayout {
        VertexLayout {
            uv_layers: self.uv_layer_count,
            color_layers: self.color_layer_count,
            shell: self.is_shell(),
        }
    }

    /// Vertex count as declared by the file, or as last set by [`Self::set_geometry`].
    #[inline]
    pub fn vertex_count(&self) -> usize { self.vertex_count }

    #[inline]
    pub fn tri_count(&self) -> usize { self.tri_count }

    #[inline]
    pub fn has_geometry(&self) -> bool { !self.vertices.is_empty() && !self.tris.is_empty() }

    /// Replaces the vertex and triangle buffers.
    pub fn set_geometry(&mut self, vertices: Vec<PackedVertex>, tris: Vec<[u16; 3]>) {
        self.vertex_count = vertices.len();
        self.tri_count = tris.len();
        self.vertices = vertices;
        self.tris = tris;
    }

    /// First triangle with an index past the vertex buffer.
    pub fn bad_triangle(&self) -> Option<usize> {
        let count = self.vertices.len();
        self.tris.iter().position(|t| t.iter().any(|&i| i as usize >= count))
    }

    /// Every triangle index must address a vertex.
    pub fn check_indices(&self, index: usize) -> Result<()> {
        match self.bad_triangle() {
            Some(t) => Err(Error::malformed(format!(
                "Model {index}: triangle {t} indexes past {} vertices",
                self.vertices.len()
            ))),
            None => Ok(()),
        }
    }

    fn to_info(&self, vertex_offset: u64, index_offset: u64) -> ModelInfo {
        ModelInfo {
            flag: self.flag,
            lod_index: self.lod_index,
            material: self.material.clone(),
            uv_layer_count: self.uv_layer_count,
            color_layer_count: self.color_layer_count,
            vertex_count: self.vertices.len() as u32,
            index_count: (self.tris.len() * 3) as u32,
            vertex_offset: vertex_offset as u32,
            index_offset: index_offset as u32,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Header, bones and model metadata only.
    Quick,
    /// Everything, including vertex and index buffers.
    Full,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Mdl2Container {
    pub version: u32,
    pub pack_offset: f32,
    pub bone_names: Vec<String>,
    /// [`NO_PARENT`] marks a root.
    pub bone_parents: Vec<u8>,
    pub bone_matrices: Vec<Mat4>,
    pub models: Vec<ModelRecord>,
}

/// Byte positions of every section, relative to the start of the file.
struct Placement {
    buffer_offset: u64,
    buffer_size: u64,
    vertex_offsets: Vec<u64>,
    index_offsets: Vec<u64>,
}

impl Mdl2Container {
    pub fn from_bytes(data: &[u8], mode: ReadMode) -> Result<Self> {
        Self::read(&mut Cursor::new(data), mode)
    }

    #[inline]
    pub fn read_quick<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Self::read(reader, ReadMode::Quick)
    }

    #[inline]
    pub fn read_full<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Self::read(reader, ReadMode::Full)
    }

    /// Reads a container. The file must use the layout [`Self::write`]
    /// produces (offsets, zero padding, no trailing bytes), so that rewriting
    /// it changes nothing but the models that were edited.
    pub fn read<R: Read + Seek>(reader: &mut R, mode: ReadMode) -> Result<Self> {
        let start = reader.stream_position()?;
        let file_len = remaining(reader)?;
        let header: Mdl2Header = read_value(reader)?;
        let buffer_end = header.buffer_offset as u64 + header.buffer_size as u64;
        if buffer_end > file_len {
            return Err(Error::malformed(format!(
                "Geometry region {:#x}..{:#x} lies outside the {:#x} byte file",
                header.buffer_offset, buffer_end, file_len
            )));
        }

        let bone_count = header.bone_count as usize;
        let bone_names = read_values::<SizedString, _>(reader, bone_count)?
            .into_iter()
            .map(SizedString::into_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::malformed(format!("Bone name is not UTF-8: {e}")))?;
        align_reader(reader, start, TABLE_ALIGN)?;
        let bone_parents = read_values::<u8, _>(reader, bone_count)?;
        align_reader(reader, start, TABLE_ALIGN)?;
        let bone_matrices = read_values::<CMatrix4f, _>(reader, bone_count)?
            .into_iter()
            .map(Mat4::from)
            .collect::<Vec<_>>();
        validate_bone_parents(&bone_parents)?;

        let infos = read_values::<ModelInfo, _>(reader, header.model_count as usize)?;
        let mut models = Vec::with_capacity(infos.len());
        for (index, info) in infos.iter().enumerate() {
            validate_model_info(index, info, header.buffer_size as u64)?;
            models.push(ModelRecord {
                flag: info.flag,
                lod_index: info.lod_index,
                material: info.material.clone(),
                uv_layer_count: info.uv_layer_count,
                color_layer_count: info.color_layer_count,
                vertices: vec![],
                tris: vec![],
                vertex_count: info.vertex_count as usize,
                tri_count: info.index_count as usize / 3,
            });
        }
        let mut container = Self {
            version: header.version,
            pack_offset: header.pack_offset,
            bone_names,
            bone_parents,
            bone_matrices,
            models,
        };

        let placement = container.placement_with(|m| (m.vertex_count, m.tri_count));
        check_placement(&placement, &header, &infos, file_len)?;
        skip_padding(reader, start + placement.buffer_offset)?;
        if mode == ReadMode::Full {
            let buffers = start + placement.buffer_offset;
            for (i, model) in container.models.iter_mut().enumerate() {
                skip_padding(reader, buffers + placement.vertex_offsets[i])?;
                let layout = model.layout();
                let mut vertices = Vec::with_capacity(model.vertex_count);
                for _ in 0..model.vertex_count {
                    vertices.push(read_value_args::<PackedVertex, _>(reader, layout)?);
                }
                model.vertices = vertices;
            }
            for (i, model) in container.models.iter_mut().enumerate() {
                skip_padding(reader, buffers + placement.index_offsets[i])?;
                model.tris = read_values::<[u16; 3], _>(reader, model.tri_count)?;
                model.check_indices(i)?;
            }
        }
        log::debug!(
            "Read MDL2 v{} with {} bones and {} models ({:?})",
            header.version,
            bone_count,
            container.models.len(),
            mode
        );
        Ok(container)
    }

    /// Serializes the whole container.
    ///
    /// Every model must carry geometry; a quick-read model that was never
    /// patched is refused with [`Error::IncompleteModel`].
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.validate()?;
        let placement = self.placement();
        let start = writer.stream_position()?;

        write_value(writer, &Mdl2Header {
            version: self.version,
            bone_count: self.bone_names.len() as u32,
            model_count: self.models.len() as u32,
            pack_offset: self.pack_offset,
            buffer_offset: placement.buffer_offset as u32,
            buffer_size: placement.buffer_size as u32,
        })?;
        for name in &self.bone_names {
            write_value(writer, &SizedString::from_string(name))?;
        }
        align_writer(writer, start, TABLE_ALIGN)?;
        for parent in &self.bone_parents {
            write_value(writer, parent)?;
        }
        align_writer(writer, start, TABLE_ALIGN)?;
        for matrix in &self.bone_matrices {
            write_value(writer, &CMatrix4f::from(matrix))?;
        }
        for (i, model) in self.models.iter().enumerate() {
            write_value(
                writer,
                &model.to_info(placement.vertex_offsets[i], placement.index_offsets[i]),
            )?;
        }

        let buffers = start + placement.buffer_offset;
        for (i, model) in self.models.iter().enumerate() {
            pad_to(writer, buffers + placement.vertex_offsets[i])?;
            let layout = model.layout();
            for vertex in &model.vertices {
                write_value_args(writer, vertex, layout)?;
            }
        }
        for (i, model) in self.models.iter().enumerate() {
            pad_to(writer, buffers + placement.index_offsets[i])?;
            for tri in &model.tris {
                write_value(writer, tri)?;
            }
        }
        Ok(())
    }

    /// Serializes into a buffer sized exactly for the computed layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let placement = self.placement();
        let size = placement.buffer_offset + placement.buffer_size;
        let mut writer = BoundedWriter::with_capacity(size as usize);
        self.write(&mut writer).map_err(unwrap_capacity_error)?;
        Ok(writer.into_inner())
    }

    /// Checks every invariant the writer relies on.
    pub fn validate(&self) -> Result<()> {
        let bone_count = self.bone_names.len();
        if self.bone_parents.len() != bone_count || self.bone_matrices.len() != bone_count {
            return Err(Error::malformed(format!(
                "Bone tables disagree: {} names, {} parents, {} matrices",
                bone_count,
                self.bone_parents.len(),
                self.bone_matrices.len()
            )));
        }
        validate_bone_parents(&self.bone_parents)?;
        for (index, model) in self.models.iter().enumerate() {
            if !model.has_geometry() {
                return Err(Error::IncompleteModel { index });
            }
            if model.vertices.len() > MAX_VERTICES {
                return Err(Error::VertexBudgetExceeded {
                    mesh: format!("model {index}"),
                    limit: MAX_VERTICES,
                });
            }
            if model.uv_layer_count > MAX_LAYERS || model.color_layer_count > MAX_LAYERS {
                return Err(Error::malformed(format!(
                    "Model {index} declares {} UV and {} color layers",
                    model.uv_layer_count, model.color_layer_count
                )));
            }
            let layout = model.layout();
            if let Some(v) = model.vertices.iter().position(|v| !v.matches(layout)) {
                return Err(Error::malformed(format!(
                    "Model {index}: vertex {v} does not match layout {layout:?}"
                )));
            }
            model.check_indices(index)?;
        }
        Ok(())
    }

    #[inline]
    fn placement(&self) -> Placement { self.placement_with(|m| (m.vertices.len(), m.tris.len())) }

    /// Canonical layout for the given `(vertices, triangles)` count of each model.
    fn placement_with<F>(&self, counts: F) -> Placement
    where F: Fn(&ModelRecord) -> (usize, usize) {
        let mut pos = HEADER_SIZE;
        pos += self.bone_names.iter().map(|n| SizedString::encoded_len(n) as u64).sum::<u64>();
        pos = align_up(pos, TABLE_ALIGN) + self.bone_parents.len() as u64;
        pos = align_up(pos, TABLE_ALIGN) + MATRIX_SIZE * self.bone_matrices.len() as u64;
        pos += self.models.iter().map(|m| m.to_info(0, 0).encoded_len()).sum::<u64>();
        let buffer_offset = align_up(pos, BUFFER_ALIGN);

        let mut cursor = 0u64;
        let mut vertex_offsets = Vec::with_capacity(self.models.len());
        for model in &self.models {
            cursor = align_up(cursor, BUFFER_ALIGN);
            vertex_offsets.push(cursor);
            cursor += counts(model).0 as u64 * model.layout().stride();
        }
        let mut index_offsets = Vec::with_capacity(self.models.len());
        for model in &self.models {
            cursor = align_up(cursor, BUFFER_ALIGN);
            index_offsets.push(cursor);
            cursor += counts(model).1 as u64 * 6;
        }
        Placement { buffer_offset, buffer_size: cursor, vertex_offsets, index_offsets }
    }
}

fn check_placement(
    placement: &Placement,
    header: &Mdl2Header,
    infos: &[ModelInfo],
    file_len: u64,
) -> Result<()> {
    let stored = (header.buffer_offset as u64, header.buffer_size as u64);
    if stored != (placement.buffer_offset, placement.buffer_size) {
        return Err(Error::malformed(format!(
            "Geometry region at {:#x} ({:#x} bytes), expected {:#x} ({:#x} bytes)",
            stored.0, stored.1, placement.buffer_offset, placement.buffer_size
        )));
    }
    if placement.buffer_offset + placement.buffer_size != file_len {
        return Err(Error::malformed(format!(
            "{:#x} trailing bytes after the geometry region",
            file_len - placement.buffer_offset - placement.buffer_size
        )));
    }
    for (index, info) in infos.iter().enumerate() {
        let stored = (info.vertex_offset as u64, info.index_offset as u64);
        let expected = (placement.vertex_offsets[index], placement.index_offsets[index]);
        if stored != expected {
            return Err(Error::malformed(format!(
                "Model {index} buffers at {:#x}/{:#x}, expected {:#x}/{:#x}",
                stored.0, stored.1, expected.0, expected.1
            )));
        }
    }
    Ok(())
}

fn validate_model_info(index: usize, info: &ModelInfo, buffer_size: u64) -> Result<()> {
    if info.uv_layer_count > MAX_LAYERS || info.color_layer_count > MAX_LAYERS {
        return Err(Error::malformed(format!(
            "Model {index} declares {} UV and {} color layers",
            info.uv_layer_count, info.color_layer_count
        )));
    }
    if info.index_count % 3 != 0 {
        return Err(Error::malformed(format!(
            "Model {index} index count {} is not a multiple of 3",
            info.index_count
        )));
    }
    let layout = VertexLayout {
        uv_layers: info.uv_layer_count,
        color_layers: info.color_layer_count,
        shell: info.flag == SHELL_FLAG,
    };
    let vertex_end = info.vertex_offset as u64 + info.vertex_count as u64 * layout.stride();
    let index_end = info.index_offset as u64 + info.index_count as u64 * 2;
    if vertex_end > buffer_size || index_end > buffer_size {
        return Err(Error::malformed(format!(
            "Model {index} buffers end at {:#x}/{:#x}, past the {:#x} byte geometry region",
            vertex_end, index_end, buffer_size
        )));
    }
    Ok(())
}

/// Parents must be in range or [`NO_PARENT`], and must not form cycles.
pub fn validate_bone_parents(parents: &[u8]) -> Result<()> {
    let count = parents.len();
    for (bone, &parent) in parents.iter().enumerate() {
        if parent != NO_PARENT && parent as usize >= count {
            return Err(Error::malformed(format!(
                "Bone {bone} has parent {parent}, but there are only {count} bones"
            )));
        }
    }
    for bone in 0..count {
        let mut current = parents[bone];
        let mut steps = 0;
        while current != NO_PARENT {
            steps += 1;
            if steps > count {
                return Err(Error::malformed(format!("Bone {bone} is part of a parent cycle")));
            }
            current = parents[current as usize];
        }
    }
    Ok(())
}
