use std::io::{Cursor, Read, Seek};

use binrw::binrw;
use indexmap::IndexMap;
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::mdl2::ReadMode,
    util::stream::{read_value, read_values, remaining},
};

pub const HEADER_SIZE: u64 = 28;
// 3 f32 euler angles + 3 i16 translation components
const SAMPLE_SIZE: u64 = 12 + 6;
/// Bones a `u8` parent table can address.
pub const MAX_BONES: u32 = 256;

#[binrw]
#[brw(magic = b"BANI")]
#[derive(Clone, Debug, Default)]
pub struct BaniHeader {
    pub version: u32,
    pub animation_length: f32,
    pub num_frames: u32,
    pub bone_count: u32,
    pub translation_scale: f32,
    pub translation_offset: f32,
}

/// Per-frame samples for one bone.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoneCurve {
    /// XYZ euler angles in degrees.
    pub eulers: Vec<[f32; 3]>,
    pub translations: Vec<[f32; 3]>,
}

/// Baked animation: one curve per covered bone, in file order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BaniContainer {
    pub version: u32,
    pub animation_length: f32,
    pub num_frames: u32,
    pub bone_count: u32,
    pub translation_scale: f32,
    pub translation_offset: f32,
    /// Empty after a quick read.
    pub curves: Vec<BoneCurve>,
}

impl BaniContainer {
    pub fn from_bytes(data: &[u8], mode: ReadMode) -> Result<Self> {
        Self::read(&mut Cursor::new(data), mode)
    }

    pub fn read<R: Read + Seek>(reader: &mut R, mode: ReadMode) -> Result<Self> {
        let header: BaniHeader = read_value(reader)?;
        let mut bani = Self {
            version: header.version,
            animation_length: header.animation_length,
            num_frames: header.num_frames,
            bone_count: header.bone_count,
            translation_scale: header.translation_scale,
            translation_offset: header.translation_offset,
            curves: vec![],
        };
        if header.bone_count > MAX_BONES {
            return Err(Error::malformed(format!(
                "BANI claims {} bones, at most {MAX_BONES} are addressable",
                header.bone_count
            )));
        }
        let body_size = header.bone_count as u64 * header.num_frames as u64 * SAMPLE_SIZE;
        let available = remaining(reader)?;
        if body_size > available {
            return Err(Error::malformed(format!(
                "{} bones × {} frames need {:#x} bytes, only {:#x} remain",
                header.bone_count, header.num_frames, body_size, available
            )));
        }
        if mode == ReadMode::Quick {
            return Ok(bani);
        }

        let frames = header.num_frames as usize;
        let mut eulers = Vec::with_capacity(header.bone_count as usize);
        for _ in 0..header.bone_count {
            eulers.push(read_values::<[f32; 3], _>(reader, frames)?);
        }
        for bone_eulers in eulers {
            let raw = read_values::<[i16; 3], _>(reader, frames)?;
            let translations = raw.into_iter().map(|t| bani.dequantize(t)).collect();
            bani.curves.push(BoneCurve { eulers: bone_eulers, translations });
        }
        log::debug!(
            "Read BANI with {} bones × {} frames over {}s",
            bani.bone_count,
            bani.num_frames,
            bani.animation_length
        );
        Ok(bani)
    }

    #[inline]
    fn dequantize(&self, raw: [i16; 3]) -> [f32; 3] {
        raw.map(|v| self.translation_offset + v as f32 * self.translation_scale)
    }

    /// Frames per second, or `None` when the stored length is not positive.
    pub fn fps(&self) -> Option<u32> {
        (self.animation_length > 0.0)
            .then(|| (self.num_frames as f32 / self.animation_length).round() as u32)
    }

    /// Names the curves by pairing them with a skeleton's bone order.
    ///
    /// The file may cover fewer bones than the skeleton has; the trailing
    /// skeleton bones then get no curve.
    pub fn bind(&self, bone_order: &[String]) -> Result<IndexMap<String, BoneCurve>> {
        if self.curves.len() > bone_order.len() {
            return Err(Error::malformed(format!(
                "Animation has {} curves but the skeleton only has {} bones",
                self.curves.len(),
                bone_order.len()
            )));
        }
        Ok(bone_order.iter().cloned().zip(self.curves.iter().cloned()).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use binrw::BinWriterExt;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Builds a BANI file where bone `b`, frame `f` rotates by `(b, f, 0)`
    /// degrees and translates by raw `(f, -b, 1)`.
    pub(crate) fn sample_bytes(bones: u32, frames: u32) -> Vec<u8> {
        let mut w = Cursor::new(Vec::new());
        w.write_le(&BaniHeader {
            version: 3,
            animation_length: frames as f32 / 30.0,
            num_frames: frames,
            bone_count: bones,
            translation_scale: 0.5,
            translation_offset: 1.0,
        })
        .unwrap();
        for b in 0..bones {
            for f in 0..frames {
                w.write_le(&[b as f32, f as f32, 0.0f32]).unwrap();
            }
        }
        for b in 0..bones {
            for f in 0..frames {
                w.write_le(&[f as i16, -(b as i16), 1i16]).unwrap();
            }
        }
        w.into_inner()
    }

    #[test]
    fn reads_curves() {
        let bani = BaniContainer::from_bytes(&sample_bytes(2, 4), ReadMode::Full).unwrap();
        assert_eq!(bani.curves.len(), 2);
        assert_eq!(bani.fps(), Some(30));
        let curve = &bani.curves[1];
        assert_eq!(curve.eulers.len(), 4);
        assert_eq!(curve.translations.len(), 4);
        assert_eq!(curve.eulers[3], [1.0, 3.0, 0.0]);
        assert_eq!(curve.translations[3], [2.5, 0.5, 1.5]);
    }

    #[test]
    fn bone_count_is_bounded() {
        let mut w = Cursor::new(Vec::new());
        w.write_le(&BaniHeader { num_frames: 0, bone_count: 50_000_000, ..Default::default() })
            .unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        for mode in [ReadMode::Quick, ReadMode::Full] {
            assert!(matches!(
                BaniContainer::from_bytes(&bytes, mode),
                Err(Error::MalformedContainer(_))
            ));
        }

        let bani = BaniContainer::from_bytes(&sample_bytes(0, 0), ReadMode::Full).unwrap();
        assert!(bani.curves.is_empty());
    }

    #[test]
    fn quick_read_skips_curves() {
        let bani = BaniContainer::from_bytes(&sample_bytes(3, 2), ReadMode::Quick).unwrap();
        assert_eq!(bani.bone_count, 3);
        assert!(bani.curves.is_empty());
    }

    #[test]
    fn short_body_is_malformed() {
        let bytes = sample_bytes(2, 4);
        assert!(matches!(
            BaniContainer::from_bytes(&bytes[..bytes.len() - 1], ReadMode::Quick),
            Err(Error::MalformedContainer(_))
        ));
        assert!(matches!(
            BaniContainer::from_bytes(&bytes[..12], ReadMode::Quick),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn zero_length_has_no_fps() {
        let bani = BaniContainer { num_frames: 10, ..Default::default() };
        assert_eq!(bani.fps(), None);
    }

    #[test]
    fn binds_fewer_curves_than_bones() {
        let bani = BaniContainer::from_bytes(&sample_bytes(2, 1), ReadMode::Full).unwrap();
        let names = vec!["root".to_string(), "hips".to_string(), "srb".to_string()];
        let bound = bani.bind(&names).unwrap();
        assert_eq!(bound.keys().collect::<Vec<_>>(), vec!["root", "hips"]);
        assert!(bani.bind(&names[..1]).is_err());
    }
}
