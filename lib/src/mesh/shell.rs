//! Shell (fur/grass) geometry: the same triangles drawn several times with a
//! shader-driven offset.

/// Returns the base triangles followed by `shell_count` more copies of them.
pub fn replicate_shells<T: Clone>(base: &[T], shell_count: u32) -> Vec<T> {
    let mut out = Vec::with_capacity(base.len() * (shell_count as usize + 1));
    for _ in 0..=shell_count {
        out.extend_from_slice(base);
    }
    out
}

/// Keeps the first `len / shell_count` faces and returns the shell count the
/// remaining geometry should be exported with. `None` for a zero count.
pub fn strip_shells<T>(faces: &mut Vec<T>, shell_count: u32) -> Option<u32> {
    if shell_count == 0 {
        return None;
    }
    faces.truncate(faces.len() / shell_count as usize);
    Some(shell_count - 1)
}
