use std::io::{Cursor, Read, Seek};

use binrw::binrw;
use serde_derive::Serialize;

use crate::{error::Result, format::SizedString, util::stream::read_value};

#[binrw]
#[brw(magic = b"FGM ")]
#[derive(Clone, Debug, Default, Serialize)]
pub struct FgmFile {
    pub version: u32,
    #[bw(try_calc = textures.len().try_into())]
    pub texture_count: u32,
    #[bw(try_calc = attributes.len().try_into())]
    pub attribute_count: u32,
    #[br(count = texture_count)]
    pub textures: Vec<FgmTexture>,
    #[br(count = attribute_count)]
    pub attributes: Vec<FgmAttribute>,
}

#[binrw]
#[derive(Clone, Debug, Default, Serialize)]
pub struct FgmTexture {
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub name: String,
    pub kind: u32,
    /// Texture array indices; slot 1 selects the layer within the array.
    pub layers: [u32; 4],
}

#[binrw]
#[brw(repr(u32))]
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum EAttributeKind {
    Float = 0,
    Float2 = 1,
    Float3 = 2,
    Float4 = 3,
    Int = 5,
    Bool = 6,
}

#[binrw]
#[derive(Clone, Debug, Serialize)]
pub struct FgmAttribute {
    #[br(try_map = SizedString::into_string)]
    #[bw(map = SizedString::from_string)]
    pub name: String,
    pub kind: EAttributeKind,
    #[br(args { kind })]
    pub value: FgmValue,
}

#[binrw]
#[br(import { kind: EAttributeKind })]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FgmValue {
    #[br(pre_assert(kind == EAttributeKind::Float))]
    Float(f32),
    #[br(pre_assert(kind == EAttributeKind::Float2))]
    Float2([f32; 2]),
    #[br(pre_assert(kind == EAttributeKind::Float3))]
    Float3([f32; 3]),
    #[br(pre_assert(kind == EAttributeKind::Float4))]
    Float4([f32; 4]),
    #[br(pre_assert(kind == EAttributeKind::Int))]
    Int(i32),
    #[br(pre_assert(kind == EAttributeKind::Bool))]
    Bool(
        #[br(map = |v: u32| v != 0)]
        #[bw(map = |b: &bool| u32::from(*b))]
        bool,
    ),
}

impl FgmFile {
    pub fn from_bytes(data: &[u8]) -> Result<Self> { Self::read(&mut Cursor::new(data)) }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> { read_value(reader) }

    pub fn attribute(&self, name: &str) -> Option<&FgmValue> {
        self.attributes.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use binrw::BinWriterExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Error;

    pub(crate) fn sample_fgm() -> FgmFile {
        FgmFile {
            version: 2,
            textures: vec![
                FgmTexture { name: "pBaseColourTexture".into(), kind: 7, layers: [0, 3, 0, 0] },
                FgmTexture { name: "pHeightTexture".into(), kind: 7, layers: [0, 5, 0, 0] },
            ],
            attributes: vec![
                FgmAttribute {
                    name: "pHeightScale".into(),
                    kind: EAttributeKind::Float,
                    value: FgmValue::Float(0.25),
                },
                FgmAttribute {
                    name: "pUVScale".into(),
                    kind: EAttributeKind::Float2,
                    value: FgmValue::Float2([2.0, 4.0]),
                },
                FgmAttribute {
                    name: "pEnableTint".into(),
                    kind: EAttributeKind::Bool,
                    value: FgmValue::Bool(true),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_attributes_by_kind() {
        let mut w = Cursor::new(Vec::new());
        w.write_le(&sample_fgm()).unwrap();
        let fgm = FgmFile::from_bytes(&w.into_inner()).unwrap();
        assert_eq!(fgm.textures[1].layers[1], 5);
        assert_eq!(fgm.attribute("pHeightScale"), Some(&FgmValue::Float(0.25)));
        assert_eq!(fgm.attribute("pUVScale"), Some(&FgmValue::Float2([2.0, 4.0])));
        assert_eq!(fgm.attribute("pEnableTint"), Some(&FgmValue::Bool(true)));
        assert_eq!(fgm.attribute("missing"), None);
    }

    #[test]
    fn unknown_kind_fails() {
        let mut w = Cursor::new(Vec::new());
        w.write_le(&sample_fgm()).unwrap();
        let mut bytes = w.into_inner();
        let at = bytes.windows(12).position(|w| w == b"pHeightScale").unwrap() + 12;
        bytes[at..at + 4].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(FgmFile::from_bytes(&bytes), Err(Error::MalformedContainer(_))));
    }
}
