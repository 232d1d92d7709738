use crate::AbiError;

/// Decode a little-endian unsigned integer of `size` bytes.
pub fn read_uint(data: &[u8], size: usize) -> Result<u64, AbiError> {
    if data.len() < size {
        return Err(AbiError::InvalidLength);
    }
    match size {
        1 => Ok(data[0] as u64),
        2 => Ok(u16::from_le_bytes([data[0], data[1]]) as u64),
        4 => Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64),
        8 => Ok(u64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ])),
        _ => Err(AbiError::InvalidLength),
    }
}

/// Decode a little-endian signed integer of `size` bytes, sign-extended.
pub fn read_int(data: &[u8], size: usize) -> Result<i64, AbiError> {
    let raw = read_uint(data, size)?;
    let shift = 64 - 8 * size as u32;
    Ok(((raw << shift) as i64) >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned() {
        assert_eq!(read_uint(&[0xff, 0x00], 1).unwrap(), 0xff);
        assert_eq!(read_uint(&[0x34, 0x12], 2).unwrap(), 0x1234);
        assert_eq!(read_uint(&[1, 0, 0, 0, 0, 0, 0, 0x80], 8).unwrap(), 0x8000_0000_0000_0001);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(read_int(&[0xff], 1).unwrap(), -1);
        assert_eq!(read_int(&[0xfe, 0xff], 2).unwrap(), -2);
        assert_eq!(read_int(&[0x7f], 1).unwrap(), 127);
    }

    #[test]
    fn bad_sizes() {
        assert!(read_uint(&[1, 2], 4).is_err());
        assert!(read_uint(&[1, 2, 3], 3).is_err());
    }
}
