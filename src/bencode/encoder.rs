/// Minimal bencode writer for the handful of shapes the tracker emits
pub trait BencodeEncode {
    fn bencode(&self, buf: &mut Vec<u8>);
}

macro_rules! impl_bencode_integer {
    ($($ty:ty),*) => {
        $(
            impl BencodeEncode for $ty {
                fn bencode(&self, buf: &mut Vec<u8>) {
                    let mut digits = itoa::Buffer::new();
                    buf.push(b'i');
                    buf.extend_from_slice(digits.format(*self).as_bytes());
                    buf.push(b'e');
                }
            }
        )*
    };
}

impl_bencode_integer!(i64, u64, u32);

impl BencodeEncode for [u8] {
    fn bencode(&self, buf: &mut Vec<u8>) {
        let mut digits = itoa::Buffer::new();
        buf.extend_from_slice(digits.format(self.len()).as_bytes());
        buf.push(b':');
        buf.extend_from_slice(self);
    }
}

impl BencodeEncode for str {
    fn bencode(&self, buf: &mut Vec<u8>) {
        self.as_bytes().bencode(buf);
    }
}

/// Writes `d ... e` around whatever `body` appends.
/// Callers are responsible for key order.
pub fn write_dict<F>(buf: &mut Vec<u8>, body: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    buf.push(b'd');
    body(buf);
    buf.push(b'e');
}
