//! Integer helpers shared by the geometry and motor code.

/// Round `value` up to the next multiple of `multiple` (`multiple == 0` returns `value`).
#[inline]
pub fn align_up(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

/// Round `value` down to a multiple of `multiple` (`multiple == 0` returns `value`).
#[inline]
pub fn align_down(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    (value / multiple) * multiple
}

/// `value * num / den` with a 64-bit intermediate, saturating to `u32`.
#[inline]
pub fn scale(value: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 0;
    }
    let v = u64::from(value) * u64::from(num) / u64::from(den);
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Ceiling variant of [`scale`].
#[inline]
pub fn scale_ceil(value: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 0;
    }
    let v = (u64::from(value) * u64::from(num)).div_ceil(u64::from(den));
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Clamp a `u32` into `u16` range.
#[inline]
pub fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(2550, 4), 2552);
        assert_eq!(align_up(2552, 4), 2552);
        assert_eq!(align_down(2551, 4), 2548);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn scaling_uses_wide_intermediate() {
        assert_eq!(scale(u32::MAX, 2, 4), u32::MAX / 2);
        assert_eq!(scale_ceil(1700, 1, 8), 213);
        assert_eq!(scale(5, 1, 0), 0);
    }
}
