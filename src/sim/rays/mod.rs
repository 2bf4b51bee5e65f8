use crate::sim::precision::Precision;

/// Name of the buffer every ray batch starts with.
pub const PRIMARY_BUFFER: &str = "default";

/// Name of the optional buffer holding per-bin emission.
pub const EMISSION_BUFFER: &str = "emission";

/// A named per-ray buffer with `num_channels` values per ray.
///
/// Values for ray `r` and channel `c` are stored at `r * num_channels + c`.
#[derive(Debug, Clone)]
pub struct ChannelBuffer<P: Precision> {
    pub name: String,
    num_rays: usize,
    num_channels: usize,
    values: Vec<P>,
}

impl<P: Precision> ChannelBuffer<P> {
    pub fn new(name: &str, num_rays: usize, num_channels: usize) -> Self {
        Self {
            name: name.to_string(),
            num_rays,
            num_channels,
            values: vec![P::zero(); num_rays * num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_rays(&self) -> usize {
        self.num_rays
    }

    /// Resizes the buffer to `num_channels` per ray. Existing values are not preserved.
    pub fn set_num_channels(&mut self, num_channels: usize) {
        self.num_channels = num_channels;
        self.values.clear();
        self.values.resize(self.num_rays * num_channels, P::zero());
    }

    /// Fills every channel of every ray with `value`.
    pub fn init_const(&mut self, value: P) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Channel values of a single ray.
    pub fn ray(&self, ray: usize) -> &[P] {
        let start = ray * self.num_channels;
        &self.values[start..start + self.num_channels]
    }

    pub fn ray_mut(&mut self, ray: usize) -> &mut [P] {
        let start = ray * self.num_channels;
        &mut self.values[start..start + self.num_channels]
    }

    pub fn values(&self) -> &[P] {
        &self.values
    }
}

/// A batch of rays handed to the tracing backend.
///
/// Each ray targets one pixel. Buffer 0 is always the primary buffer; the
/// binning controller resizes it and may append an emission buffer.
#[derive(Debug, Clone)]
pub struct RayBatch<P: Precision> {
    pub pixel_ids: Vec<usize>,
    pub buffers: Vec<ChannelBuffer<P>>,
}

impl<P: Precision> RayBatch<P> {
    /// Creates a batch with one ray per pixel id and a single-channel primary buffer.
    pub fn new(pixel_ids: Vec<usize>) -> Self {
        let num_rays = pixel_ids.len();
        Self {
            pixel_ids,
            buffers: vec![ChannelBuffer::new(PRIMARY_BUFFER, num_rays, 1)],
        }
    }

    /// Creates a batch covering pixels `0..num_pixels`.
    pub fn for_pixels(num_pixels: usize) -> Self {
        Self::new((0..num_pixels).collect())
    }

    /// Number of rays in the batch.
    pub fn len(&self) -> usize {
        self.pixel_ids.len()
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.pixel_ids.is_empty()
    }

    /// Appends a named buffer, replacing an existing buffer of the same name.
    pub fn add_buffer(&mut self, num_channels: usize, name: &str) -> &mut ChannelBuffer<P> {
        let buffer = ChannelBuffer::new(name, self.len(), num_channels);
        let idx = match self.buffers.iter().position(|b| b.name == name) {
            Some(idx) => {
                self.buffers[idx] = buffer;
                idx
            }
            None => {
                self.buffers.push(buffer);
                self.buffers.len() - 1
            }
        };
        &mut self.buffers[idx]
    }

    /// Removes a named buffer. The primary buffer is never removed.
    pub fn remove_buffer(&mut self, name: &str) -> Option<ChannelBuffer<P>> {
        let idx = self.buffers.iter().skip(1).position(|b| b.name == name)? + 1;
        Some(self.buffers.remove(idx))
    }

    pub fn has_buffer(&self, name: &str) -> bool {
        self.buffers.iter().any(|b| b.name == name)
    }

    pub fn buffer(&self, name: &str) -> Option<&ChannelBuffer<P>> {
        self.buffers.iter().find(|b| b.name == name)
    }

    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut ChannelBuffer<P>> {
        self.buffers.iter_mut().find(|b| b.name == name)
    }

    /// The primary (absorption) buffer. Always present.
    pub fn primary(&self) -> &ChannelBuffer<P> {
        &self.buffers[0]
    }

    pub fn primary_mut(&mut self) -> &mut ChannelBuffer<P> {
        &mut self.buffers[0]
    }
}

pub type Ray32 = RayBatch<f32>;
pub type Ray64 = RayBatch<f64>;
