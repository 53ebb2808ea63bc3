use crate::core::error::DescriptorError;

/// Collapse runs of zero bytes into `0x00, run_length` pairs.
pub(super) fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros: u8 = 0;
    for &byte in data {
        if byte == 0 {
            zeros += 1;
            if zeros == u8::MAX {
                out.extend_from_slice(&[0, zeros]);
                zeros = 0;
            }
        } else {
            if zeros > 0 {
                out.extend_from_slice(&[0, zeros]);
                zeros = 0;
            }
            out.push(byte);
        }
    }
    if zeros > 0 {
        out.extend_from_slice(&[0, zeros]);
    }
    out
}

/// Inverse of [`rle_encode`]. A dangling zero marker at the end expands to nothing.
pub(super) fn rle_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut bytes = data.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte == 0 {
            match bytes.next() {
                Some(run) => out.resize(out.len() + run as usize, 0),
                None => break,
            }
        } else {
            out.push(byte);
        }
    }
    out
}

/// Little-endian cursor over a decoded reference.
pub(super) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(super) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DescriptorError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(DescriptorError::Truncated {
                position: self.pos,
                needed: n - available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(super) fn read_i32(&mut self) -> Result<i32, DescriptorError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    pub(super) fn read_i64(&mut self) -> Result<i64, DescriptorError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }

    /// Length-prefixed byte string padded to a 4-byte boundary.
    ///
    /// Short form: 1 length byte (< 254). Long form: `0xFE` + 3-byte length.
    pub(super) fn read_prefixed_bytes(&mut self) -> Result<Vec<u8>, DescriptorError> {
        let first = self.take(1)?[0];
        let (header_len, len) = if first < 254 {
            (1, first as usize)
        } else {
            let raw = self.take(3)?;
            (
                4,
                raw[0] as usize | (raw[1] as usize) << 8 | (raw[2] as usize) << 16,
            )
        };
        let data = self.take(len)?.to_vec();
        self.take(padding(header_len + len))?;
        Ok(data)
    }

    pub(super) fn finish(self) -> Result<(), DescriptorError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            count => Err(DescriptorError::TrailingBytes { count }),
        }
    }
}

#[derive(Default)]
pub(super) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(super) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(super) fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(super) fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(super) fn put_prefixed_bytes(&mut self, data: &[u8]) {
        let header_len = if data.len() < 254 {
            self.buf.push(data.len() as u8);
            1
        } else {
            let len = data.len() as u32;
            self.buf.push(254);
            self.buf.extend_from_slice(&len.to_le_bytes()[..3]);
            4
        };
        self.buf.extend_from_slice(data);
        let pad = padding(header_len + data.len());
        self.buf.resize(self.buf.len() + pad, 0);
    }

    pub(super) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

fn padding(written: usize) -> usize {
    (4 - written % 4) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rle_long_zero_run_splits() {
        let encoded = rle_encode(&[0u8; 300]);
        assert_eq!(encoded, vec![0, 255, 0, 45]);
        assert_eq!(rle_decode(&encoded), vec![0u8; 300]);
    }

    #[test]
    fn test_rle_mixed() {
        let data = [7, 0, 0, 0, 9, 0];
        let encoded = rle_encode(&data);
        assert_eq!(encoded, vec![7, 0, 3, 9, 0, 1]);
        assert_eq!(rle_decode(&encoded), data);
    }

    #[test]
    fn test_rle_decode_dangling_marker() {
        assert_eq!(rle_decode(&[5, 0]), vec![5]);
    }

    #[test]
    fn test_prefixed_bytes_long_form() {
        let payload = vec![0xAB; 300];
        let mut writer = Writer::default();
        writer.put_prefixed_bytes(&payload);
        let buf = writer.into_inner();
        // 4 header bytes + 300 payload bytes is already aligned
        assert_eq!(buf.len(), 304);
        assert_eq!(&buf[..4], &[254, 44, 1, 0]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_prefixed_bytes().unwrap(), payload);
        reader.finish().unwrap();
    }

    #[test]
    fn test_prefixed_bytes_short_form_padding() {
        let mut writer = Writer::default();
        writer.put_prefixed_bytes(&[1, 2]);
        assert_eq!(writer.into_inner(), vec![2, 1, 2, 0]);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(
            reader.read_i32(),
            Err(DescriptorError::Truncated {
                position: 0,
                needed: 1
            })
        );
    }
}
