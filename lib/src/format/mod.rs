pub mod bani;
pub mod fgm;
pub mod matcol;
pub mod mdl2;

use std::string::FromUtf8Error;

use binrw::binrw;
use glam::Mat4;

/// Length-prefixed string: `u32` byte count, then UTF-8 bytes without a terminator.
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct SizedString {
    #[bw(try_calc = text.len().try_into())]
    pub size: u32,
    #[br(count = size)]
    pub text: Vec<u8>,
}

impl SizedString {
    #[allow(clippy::ptr_arg)]
    pub fn from_string(str: &String) -> Self {
        #[allow(clippy::needless_update)]
        Self { text: str.as_bytes().to_vec(), ..Default::default() }
    }

    pub fn into_string(self) -> Result<String, FromUtf8Error> { String::from_utf8(self.text) }

    /// Encoded size in bytes.
    #[inline]
    pub fn encoded_len(str: &str) -> usize { 4 + str.len() }
}

/// Row-major 4x4 matrix as stored on disk.
#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct CMatrix4f {
    pub m: [f32; 16],
}

impl From<CMatrix4f> for Mat4 {
    fn from(value: CMatrix4f) -> Self { Mat4::from_cols_array(&value.m).transpose() }
}

impl From<&Mat4> for CMatrix4f {
    fn from(value: &Mat4) -> Self { Self { m: value.transpose().to_cols_array() } }
}
