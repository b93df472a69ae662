//! Packet buffers handed through the capture hook

/// Owned packet buffer
///
/// Moving a `Packet` is the ownership transfer: whoever holds it last either
/// forwards it to the delegate handler or lets it drop, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    tot_len: usize,
}

impl Packet {
    /// Wrap a received frame; the total length is the buffer length
    pub fn new(data: Vec<u8>) -> Self {
        let tot_len = data.len();
        Self { data, tot_len }
    }

    /// Wrap a buffer whose declared length differs from its allocation
    ///
    /// Used when the capture layer hands over a larger receive buffer, or
    /// a length the driver reported that may disagree with the bytes present.
    pub fn with_len(data: Vec<u8>, tot_len: usize) -> Self {
        Self { data, tot_len }
    }

    /// Declared total length, used for byte accounting
    pub fn len(&self) -> usize {
        self.tot_len
    }

    pub fn is_empty(&self) -> bool {
        self.tot_len == 0
    }

    /// Borrowed view for classification
    pub fn view(&self) -> PacketRef<'_> {
        PacketRef::new(&self.data, self.tot_len)
    }

    /// Frame bytes, truncated to the declared length
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.tot_len);
        self.data
    }
}

/// Borrowed view over one packet's bytes plus its total-length field
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    bytes: &'a [u8],
    tot_len: usize,
}

impl<'a> PacketRef<'a> {
    pub fn new(bytes: &'a [u8], tot_len: usize) -> Self {
        Self { bytes, tot_len }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes, bytes.len())
    }

    pub fn tot_len(&self) -> usize {
        self.tot_len
    }

    /// Readable bytes: never past `tot_len`, never past the buffer
    pub fn data(&self) -> &'a [u8] {
        &self.bytes[..self.tot_len.min(self.bytes.len())]
    }
}
