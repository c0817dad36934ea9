use std::{
    fs,
    io,
    io::{Cursor, Read, Seek},
    path::{Path, PathBuf},
};

use binrw::binrw;
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::{fgm::FgmFile, SizedString},
    util::stream::read_value,
};

/// Layer that carries no texture slot of its own.
pub const DEFAULT_LAYER: &str = "Default";

#[binrw]
#[brw(magic = b"MATC")]
#[derive(Clone, Debug, Default, Serialize)]
pub struct MaterialCollection {
    pub version: u32,
    #[bw(try_calc = layers.len().try_into())]
    pub layer_count: u32,
    #[br(count = layer_count)]
    pub layers: Vec<MaterialLayer>,
}

#[binrw]
#[derive(Clone, Debug, Default, Serialize)]
pub struct MaterialLayer {
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub name: String,
    #[bw(try_calc = infos.len().try_into())]
    pub info_count: u32,
    #[br(count = info_count)]
    pub infos: Vec<LayerInfo>,
    #[bw(try_calc = attribs.len().try_into())]
    pub attrib_count: u32,
    #[br(count = attrib_count)]
    pub attribs: Vec<LayerAttrib>,
}

#[binrw]
#[derive(Clone, Debug, Default, Serialize)]
pub struct LayerInfo {
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub name: String,
    pub value: [f32; 4],
}

#[binrw]
#[derive(Clone, Debug, Default, Serialize)]
pub struct LayerAttrib {
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub name: String,
    pub value: [i32; 4],
}

impl MaterialCollection {
    pub fn from_bytes(data: &[u8]) -> Result<Self> { Self::read(&mut Cursor::new(data)) }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> { read_value(reader) }
}

/// Texture and transform parameters of one blended material layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerSlot {
    pub layer: String,
    /// Index into the base colour texture array.
    pub base_index: u32,
    /// Index into the height texture array.
    pub height_index: u32,
    pub height_offset: f32,
    pub height_scale: f32,
    /// Radians.
    pub uv_rotation: f32,
    pub uv_scale: [f32; 3],
}

// positions of the layer's info blocks
const INFO_HEIGHT_OFFSET: usize = 1;
const INFO_HEIGHT_SCALE: usize = 3;
const INFO_UV_ROTATION: usize = 5;
const INFO_UV_SCALE: usize = 7;
// array slot used by the texture entries
const TEXTURE_ARRAY_SLOT: usize = 1;

/// Resolves the slot parameters of every non-default layer.
///
/// `load` is called with each layer's name and returns the layer's FGM.
pub fn resolve_layer_slots<F>(matcol: &MaterialCollection, mut load: F) -> Result<Vec<LayerSlot>>
where F: FnMut(&str) -> Result<FgmFile> {
    let mut slots = Vec::new();
    for layer in &matcol.layers {
        if layer.name == DEFAULT_LAYER {
            log::debug!("Skipping {DEFAULT_LAYER} layer");
            continue;
        }
        let fgm = load(&layer.name)?;
        let texture_index = |i: usize| -> Result<u32> {
            fgm.textures.get(i).map(|t| t.layers[TEXTURE_ARRAY_SLOT]).ok_or_else(|| {
                Error::malformed(format!("FGM for layer '{}' has no texture {i}", layer.name))
            })
        };
        let info = |i: usize| -> Result<[f32; 4]> {
            layer.infos.get(i).map(|info| info.value).ok_or_else(|| {
                Error::malformed(format!("Layer '{}' has no info block {i}", layer.name))
            })
        };
        let uv_scale = info(INFO_UV_SCALE)?;
        slots.push(LayerSlot {
            layer: layer.name.clone(),
            base_index: texture_index(0)?,
            height_index: texture_index(1)?,
            height_offset: info(INFO_HEIGHT_OFFSET)?[0],
            height_scale: info(INFO_HEIGHT_SCALE)?[0],
            uv_rotation: info(INFO_UV_ROTATION)?[0],
            uv_scale: [uv_scale[0], uv_scale[1], uv_scale[2]],
        });
    }
    Ok(slots)
}

/// Marks base colour texture arrays.
pub const BASE_COLOUR_TEXTURE: &str = ".pbasecolourtexture";
/// Marks height texture arrays.
pub const HEIGHT_TEXTURE: &str = ".pheighttexture";

/// PNG textures exported next to a material collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MaterialTextures {
    /// Indexed by [`LayerSlot::base_index`].
    pub base_colour: Vec<PathBuf>,
    /// Indexed by [`LayerSlot::height_index`].
    pub height: Vec<PathBuf>,
    pub normal: PathBuf,
    /// Texture paths picked for each slot.
    pub slots: Vec<SlotTextures>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlotTextures {
    pub layer: String,
    pub base_colour: Option<PathBuf>,
    pub height: Option<PathBuf>,
    pub blend_weights: PathBuf,
}

impl MaterialTextures {
    /// Lists the PNG files in `dir` and resolves them with [`Self::from_listing`].
    pub fn resolve(dir: &Path, stem: &str, root: &str, slots: &[LayerSlot]) -> Result<Self> {
        let mut files = Vec::new();
        let entries = fs::read_dir(dir).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to list '{}': {e}", dir.display()))
        })?;
        for entry in entries {
            if let Some(name) = entry?.file_name().to_str() {
                files.push(name.to_string());
            }
        }
        Ok(Self::from_listing(dir, stem, root, files, slots))
    }

    /// Texture arrays are the PNG files whose name contains `root` and the array
    /// marker, in name order. Blend masks and the normal map are named after the
    /// collection `stem`.
    pub fn from_listing<I>(
        dir: &Path,
        stem: &str,
        root: &str,
        files: I,
        slots: &[LayerSlot],
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut files = files
            .into_iter()
            .filter(|f| f.to_lowercase().ends_with(".png") && f.contains(root))
            .collect::<Vec<_>>();
        files.sort();
        let array = |marker: &str| {
            files.iter().filter(|f| f.contains(marker)).map(|f| dir.join(f)).collect::<Vec<_>>()
        };
        let base_colour = array(BASE_COLOUR_TEXTURE);
        let height = array(HEIGHT_TEXTURE);
        let pick = |array: &[PathBuf], index: u32, layer: &str| {
            let path = array.get(index as usize).cloned();
            if path.is_none() {
                log::warn!("Layer '{layer}': texture {index} out of {} found", array.len());
            }
            path
        };
        let slots = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotTextures {
                layer: slot.layer.clone(),
                base_colour: pick(&base_colour, slot.base_index, &slot.layer),
                height: pick(&height, slot.height_index, &slot.layer),
                blend_weights: dir.join(format!("{stem}.playered_blendweights_{i:02}.png")),
            })
            .collect();
        Self {
            normal: dir.join(format!("{stem}.pnormaltexture.png")),
            base_colour,
            height,
            slots,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use binrw::BinWriterExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::format::fgm::tests::sample_fgm;

    pub(crate) fn sample_matcol() -> MaterialCollection {
        let infos = (0..8)
            .map(|i| LayerInfo { name: format!("info{i}"), value: [i as f32, 0.5, 2.0, 1.0] })
            .collect::<Vec<_>>();
        MaterialCollection {
            version: 1,
            layers: vec![
                MaterialLayer { name: DEFAULT_LAYER.into(), ..Default::default() },
                MaterialLayer {
                    name: "anky_backplates".into(),
                    infos,
                    attribs: vec![LayerAttrib { name: "pEnabled".into(), value: [1, 0, 0, 0] }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_layers() {
        let mut w = Cursor::new(Vec::new());
        w.write_le(&sample_matcol()).unwrap();
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], b"MATC");
        let matcol = MaterialCollection::from_bytes(&bytes).unwrap();
        assert_eq!(matcol.layers.len(), 2);
        assert_eq!(matcol.layers[1].infos[7].name, "info7");
        assert_eq!(matcol.layers[1].attribs[0].value, [1, 0, 0, 0]);
    }

    #[test]
    fn resolves_slots() {
        let mut requested = Vec::new();
        let slots = resolve_layer_slots(&sample_matcol(), |name| {
            requested.push(name.to_string());
            Ok(sample_fgm())
        })
        .unwrap();
        assert_eq!(requested, vec!["anky_backplates"]);
        assert_eq!(slots, vec![LayerSlot {
            layer: "anky_backplates".into(),
            base_index: 3,
            height_index: 5,
            height_offset: 1.0,
            height_scale: 3.0,
            uv_rotation: 5.0,
            uv_scale: [7.0, 0.5, 2.0],
        }]);
    }

    #[test]
    fn resolves_texture_paths() {
        let slots = resolve_layer_slots(&sample_matcol(), |_| Ok(sample_fgm())).unwrap();
        let dir = Path::new("lib");
        let files = (0..6)
            .rev()
            .flat_map(|i| {
                [
                    format!("anky_backplates{BASE_COLOUR_TEXTURE}_[{i}].png"),
                    format!("anky_backplates{HEIGHT_TEXTURE}_[{i}].PNG"),
                ]
            })
            .chain([
                "anky_backplates.pbasecolourtexture_[0].dds".to_string(),
                "raptor.pheighttexture_[0].png".to_string(),
            ]);
        let textures =
            MaterialTextures::from_listing(dir, "anky", "anky_backplates", files, &slots);
        assert_eq!(textures.base_colour.len(), 6);
        assert_eq!(textures.height.len(), 6);
        assert_eq!(textures.normal, dir.join("anky.pnormaltexture.png"));
        assert_eq!(textures.slots, vec![SlotTextures {
            layer: "anky_backplates".into(),
            base_colour: Some(dir.join("anky_backplates.pbasecolourtexture_[3].png")),
            height: Some(dir.join("anky_backplates.pheighttexture_[5].PNG")),
            blend_weights: dir.join("anky.playered_blendweights_00.png"),
        }]);
    }

    #[test]
    fn missing_texture_is_unresolved() {
        let slots = resolve_layer_slots(&sample_matcol(), |_| Ok(sample_fgm())).unwrap();
        let files = vec!["anky_backplates.pbasecolourtexture_[0].png".to_string()];
        let textures = MaterialTextures::from_listing(Path::new(""), "anky", "anky", files, &slots);
        assert_eq!(textures.slots[0].base_colour, None);
        assert_eq!(textures.slots[0].height, None);
    }

    #[test]
    fn missing_info_is_malformed() {
        let mut matcol = sample_matcol();
        matcol.layers[1].infos.truncate(4);
        assert!(matches!(
            resolve_layer_slots(&matcol, |_| Ok(sample_fgm())),
            Err(Error::MalformedContainer(_))
        ));
    }
}
