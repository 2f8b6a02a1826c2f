/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    device_types::translation.rs

    Pure-data translation tables shared by the card reader and the 2741
    async line: Hollerith-to-EBCDIC column decode, and the 2741 receive
    (in) / transmit (out) byte tables.
*/

/// One punched card column: bit 11 = row 12, bit 10 = row 11, bit 9 = row 0,
/// bits 8..0 = rows 1..9 (bit 8 = row 1, ..., bit 0 = row 9).
pub type HolColumn = u16;

pub const ROW_12: u16 = 1 << 11;
pub const ROW_11: u16 = 1 << 10;
pub const ROW_0: u16 = 1 << 9;

fn digit_row(d: u16) -> u16 {
    debug_assert!((1..=9).contains(&d));
    1 << (9 - d)
}

/// Decode one punched column to EBCDIC. Returns `None` for any combination
/// outside the valid Hollerith set (§4.1 step 3: the caller sets `DataCheck`
/// and emits `0x00` on `None`).
pub fn hol_to_ebcdic(col: HolColumn) -> Option<u8> {
    if col == 0 {
        return Some(0x40); // blank
    }

    let zone12 = col & ROW_12 != 0;
    let zone11 = col & ROW_11 != 0;
    let zone0 = col & ROW_0 != 0;
    let zone_count = zone12 as u8 + zone11 as u8 + zone0 as u8;

    let mut digit: Option<u16> = None;
    for d in 1..=9u16 {
        if col & digit_row(d) != 0 {
            if digit.is_some() {
                return None; // more than one digit row punched
            }
            digit = Some(d);
        }
    }

    match (zone_count, zone0, zone11, zone12, digit) {
        // row 0 alone is digit 0, not a zone punch
        (1, true, false, false, None) => Some(0xF0),
        (0, _, _, _, Some(d)) => Some(0xF0 + d as u8),
        (1, false, false, true, Some(d)) => Some(0xC0 + d as u8), // A-I
        (1, false, true, false, Some(d)) => Some(0xD0 + d as u8), // J-R
        (1, true, false, false, Some(d)) if d >= 2 => Some(0xE0 + d as u8), // S-Z
        (1, false, false, true, None) => Some(0x50), // &
        (1, false, true, false, None) => Some(0x60), // -
        _ => None,
    }
}

/// 2741 async receive-path table (`com_2741_in`): 7-bit input byte ->
/// translated byte, `0x00` meaning untranslatable (ring the bell, §4.2
/// receive path).
pub const COM_2741_IN: [u8; 128] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xDD, 0xFA, 0xB5, 0x00, 0x00, 0x5B, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x81, 0xD7, 0x96, 0x16, 0x57, 0x8B, 0x61, 0x8D,
    0x93, 0x95, 0x90, 0xE1, 0x37, 0x40, 0x76, 0x23,
    0x15, 0x02, 0x04, 0x07, 0x08, 0x0B, 0x0D, 0x0E,
    0x10, 0x13, 0x88, 0x87, 0x84, 0x82, 0x8E, 0xA3,
    0x20, 0xE2, 0xE4, 0xE7, 0xE8, 0xEB, 0xED, 0xEE,
    0xF0, 0xF3, 0xC3, 0xC5, 0xC6, 0xC9, 0xCA, 0xCC,
    0xCF, 0xD1, 0xD2, 0xA5, 0xA6, 0xA9, 0xAA, 0xAC,
    0xAF, 0xB1, 0xB2, 0x00, 0x00, 0x00, 0x00, 0xC0,
    0x00, 0x62, 0x64, 0x67, 0x68, 0x6B, 0x6D, 0x6E,
    0x70, 0x73, 0x43, 0x45, 0x46, 0x49, 0x4A, 0x4C,
    0x4F, 0x51, 0x52, 0x25, 0x26, 0x29, 0x2A, 0x2C,
    0x2F, 0x31, 0x32, 0x00, 0xB7, 0x00, 0xF6, 0x00,
];

/// 2741 async write-path table (`com_2741_out`): byte from the channel ->
/// ASCII sent downstream, `0xFF` meaning no character is emitted (the byte
/// is a control token handled by `devices::async_line`, §4.2 write path).
pub const COM_2741_OUT: [u8; 256] = [
    0xff, b' ', b'1', 0xff, b'2', 0xff, 0xff, b'3',
    b'4', 0xff, 0xff, b'5', 0xff, b'6', b'7', 0xff,
    b'8', 0xff, 0xff, b'9', 0xff, b'0', b'#', 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    b'@', 0xff, 0xff, b'/', 0xff, b's', b't', 0xff,
    0xff, b'u', b'v', 0xff, b'w', 0xff, 0xff, b'x',
    0xff, b'y', b'z', 0xff, 0xff, 0xff, 0xff, b',',
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    b'-', 0xff, 0xff, b'j', 0xff, b'k', b'l', 0xff,
    0xff, b'm', b'n', 0xff, b'o', 0xff, 0xff, b'p',
    0xff, b'q', b'r', 0xff, 0xff, 0xff, 0xff, b'$',
    0xff, 0xff, 0xff, 0x0a, 0xff, 0x08, 0xff, 0xff,
    0xff, b'&', b'a', 0xff, b'b', 0xff, 0xff, b'c',
    b'd', 0xff, 0xff, b'e', 0xff, b'f', b'g', 0xff,
    b'h', 0xff, 0xff, b'i', 0xff, 0xff, b'.', 0xff,
    0xff, 0xff, 0x09, 0xff, 0xff, 0xff, 0xff, 0x7f,
    0xff, b' ', b'=', 0xff, b'<', 0xff, 0xff, b';',
    b':', 0xff, 0xff, b'%', 0xff, b'\'', b'>', 0xff,
    b'*', 0xff, 0xff, b'(', 0xff, b')', b'"', 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, b'?', 0xff, b'S', b'T', 0xff,
    0xff, b'U', b'V', 0xff, b'W', 0xff, 0xff, b'X',
    0xff, b'Y', b'Z', 0xff, 0xff, 0xff, 0xff, b'|',
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    b'_', b'-', 0xff, b'J', 0xff, b'K', b'L', 0xff,
    0xff, b'M', b'N', 0xff, b'O', 0xff, 0xff, b'P',
    0xff, b'Q', b'R', 0xff, 0xff, 0xff, 0xff, b'!',
    0xff, 0xff, 0xff, 0x0a, 0xff, 0x08, 0xff, 0xff,
    0xff, b'+', b'A', 0xff, b'B', 0xff, 0xff, b'C',
    b'D', 0xff, 0xff, b'E', 0xff, b'F', b'G', 0xff,
    b'H', 0xff, 0xff, b'I', 0xff, 0xff, b'~', 0xff,
    0xff, 0xff, 0x09, 0xff, 0xff, 0xff, 0xff, 0x7f,
];

/// Special out-table tokens carrying protocol meaning rather than a
/// character (§4.2 write path).
pub const OUT_TOK_ADDR: u8 = 0x1F;
pub const OUT_TOK_ADDR_ACK: u8 = 0x16;
pub const OUT_TOK_BYPASS: u8 = 0xB8;
pub const OUT_TOK_RESTORE: u8 = 0x58;
pub const OUT_TOK_ADDR9: u8 = 0x13;
pub const OUT_TOK_UTF8_NOT: u8 = 0xF6;
pub const OUT_TOK_UTF8_CENT: u8 = 0xA0;
pub const OUT_NO_CHAR: u8 = 0xff;

#[cfg(test)]
mod tests {
    use super::*;

    fn col_for_letter(c: char) -> HolColumn {
        // A-I: 12 + 1..9, J-R: 11 + 1..9, S-Z: 0 + 2..9
        match c {
            'A'..='I' => ROW_12 | digit_row(1 + (c as u16 - 'A' as u16)),
            'J'..='R' => ROW_11 | digit_row(1 + (c as u16 - 'J' as u16)),
            'S'..='Z' => ROW_0 | digit_row(2 + (c as u16 - 'S' as u16)),
            _ => panic!("not a letter"),
        }
    }

    #[test]
    fn hello_decodes_to_spec_s1_bytes() {
        let expect = [0xC8u8, 0xC5, 0xD3, 0xD3, 0xD6];
        for (ch, exp) in "HELLO".chars().zip(expect) {
            assert_eq!(hol_to_ebcdic(col_for_letter(ch)), Some(exp));
        }
    }

    #[test]
    fn blank_column_is_space() {
        assert_eq!(hol_to_ebcdic(0), Some(0x40));
    }

    #[test]
    fn digit_zero_is_row_0_alone() {
        assert_eq!(hol_to_ebcdic(ROW_0), Some(0xF0));
    }

    #[test]
    fn multiple_zone_punches_are_invalid() {
        assert_eq!(hol_to_ebcdic(ROW_12 | ROW_11 | digit_row(1)), None);
    }

    #[test]
    fn multiple_digit_punches_are_invalid() {
        assert_eq!(hol_to_ebcdic(digit_row(1) | digit_row(2)), None);
    }
}
