// The OGG CRC-32 uses polynomial 0x04C11DB7 with no bit reflection, a zero
// initial value, and no final xor. It is NOT the zlib CRC-32.

const CRC_POLYNOMIAL: u32 = 0x04C1_1DB7;

const fn make_table() -> [u32; 256] {
	let mut table = [0u32; 256];

	let mut i = 0;
	while i < 256 {
		let mut r = (i as u32) << 24;

		let mut bit = 0;
		while bit < 8 {
			r = if r & 0x8000_0000 == 0 {
				r << 1
			} else {
				(r << 1) ^ CRC_POLYNOMIAL
			};
			bit += 1;
		}

		table[i] = r;
		i += 1;
	}

	table
}

const CRC_TABLE: [u32; 256] = make_table();

pub(crate) fn update(crc: u32, data: &[u8]) -> u32 {
	let mut crc = crc;

	for byte in data {
		crc = (crc << 8) ^ CRC_TABLE[usize::from((crc >> 24) as u8 ^ *byte)];
	}

	crc
}

/// Computes the OGG CRC-32 of `data`
pub fn crc32(data: &[u8]) -> u32 {
	update(0, data)
}
