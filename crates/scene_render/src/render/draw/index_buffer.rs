//! Typed index storage and its GPU buffer

use crate::render::api::{BufferId, BufferKind, GraphicsDevice, IndexSource, IndexType};
use crate::render::RenderResult;

/// Index values in one of the three native widths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    /// 8-bit indices
    U8(Vec<u8>),
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl IndexData {
    /// Store `indices` in the narrowest width that holds every value
    ///
    /// The restart index of the chosen width is never produced by a real
    /// index, so the narrowest width leaves room for it.
    pub fn compact(indices: &[u32]) -> Self {
        let max = indices.iter().copied().max().unwrap_or(0);
        if max < u32::from(u8::MAX) {
            Self::U8(indices.iter().map(|&i| i as u8).collect())
        } else if max < u32::from(u16::MAX) {
            Self::U16(indices.iter().map(|&i| i as u16).collect())
        } else {
            Self::U32(indices.to_vec())
        }
    }

    /// Native index type
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::U8(_) => IndexType::U8,
            Self::U16(_) => IndexType::U16,
            Self::U32(_) => IndexType::U32,
        }
    }

    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether there are no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at `i`, widened
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::U8(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U16(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U32(v) => v.get(i).copied(),
        }
    }

    /// Every index, widened
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Raw bytes in native order
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U8(v) => v.as_slice(),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Smallest and largest index, skipping the restart index when `restart` is on
    pub fn min_max(&self, restart: bool) -> Option<(u32, u32)> {
        let restart_index = self.index_type().restart_index();
        self.iter()
            .filter(|&i| !(restart && i == restart_index))
            .fold(None, |acc, i| match acc {
                None => Some((i, i)),
                Some((lo, hi)) => Some((lo.min(i), hi.max(i))),
            })
    }
}

/// Index data plus its optional GPU copy
///
/// Once uploaded, draws read from the buffer object; otherwise they stream
/// the client-side copy. Editing through [`IndexBuffer::data_mut`] makes the
/// GPU copy stale until the next upload.
#[derive(Debug, Clone)]
pub struct IndexBuffer {
    data: IndexData,
    handle: Option<BufferId>,
    stale: bool,
}

impl IndexBuffer {
    /// Client-side index buffer
    pub fn new(data: IndexData) -> Self {
        Self {
            data,
            handle: None,
            stale: true,
        }
    }

    /// Index values
    pub fn data(&self) -> &IndexData {
        &self.data
    }

    /// Index values for editing
    pub fn data_mut(&mut self) -> &mut IndexData {
        self.stale = true;
        &mut self.data
    }

    /// Buffer object, once uploaded
    pub fn handle(&self) -> Option<BufferId> {
        self.handle
    }

    /// Whether the GPU copy is current
    pub fn is_uploaded(&self) -> bool {
        self.handle.is_some() && !self.stale
    }

    /// Copy the indices into a buffer object
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = device.create_buffer()?;
                self.handle = Some(handle);
                handle
            }
        };
        device.upload_buffer(handle, BufferKind::Index, self.data.as_bytes())?;
        self.stale = false;
        log::trace!("Uploaded {} {:?} indices", self.data.len(), self.data.index_type());
        Ok(())
    }

    /// Delete the buffer object; draws fall back to client-side indices
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(handle) = self.handle.take() {
            device.delete_buffer(handle);
        }
        self.stale = true;
    }

    /// Where a draw should read the indices from, and the buffer to bind
    pub(crate) fn source(&self) -> (IndexSource<'_>, Option<BufferId>) {
        if self.is_uploaded() {
            (IndexSource::Bound { offset: 0 }, self.handle)
        } else {
            (IndexSource::Client(self.data.as_bytes()), None)
        }
    }
}

impl From<IndexData> for IndexBuffer {
    fn from(data: IndexData) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_picks_narrowest_width() {
        assert_eq!(IndexData::compact(&[0, 1, 2]).index_type(), IndexType::U8);
        assert_eq!(IndexData::compact(&[0, 255]).index_type(), IndexType::U16);
        assert_eq!(IndexData::compact(&[0, 70_000]).index_type(), IndexType::U32);
    }

    #[test]
    fn test_min_max_skips_restart_index() {
        let data = IndexData::U16(vec![4, 9, u16::MAX, 2]);
        assert_eq!(data.min_max(true), Some((2, 9)));
        assert_eq!(data.min_max(false), Some((2, u32::from(u16::MAX))));
        assert_eq!(IndexData::U8(vec![u8::MAX]).min_max(true), None);
    }

    #[test]
    fn test_as_bytes_matches_width() {
        assert_eq!(IndexData::U32(vec![1, 2]).as_bytes().len(), 8);
        assert_eq!(IndexData::U16(vec![1, 2, 3]).as_bytes().len(), 6);
    }
}
