/*++

Licensed under the Apache-2.0 license.

File Name:

   rc4.rs

Abstract:

    File contains the legacy stream cipher used to obscure boot image
    header blocks. It provides compatibility with the boot ROM, not
    security; the key is fixed by the chip vendor and publicly known.

--*/

use rkimage_types::BLOCK_SIZE;

/// Vendor key baked into the boot ROM. Kept private so the cipher can
/// never be repurposed with caller-supplied key material.
const KEY: [u8; 16] = [
    124, 78, 3, 4, 85, 5, 9, 7, 45, 44, 123, 56, 23, 13, 23, 17,
];

fn key_schedule() -> [u8; 256] {
    let mut s = [0u8; 256];
    for (i, v) in s.iter_mut().enumerate() {
        *v = i as u8;
    }
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + KEY[i % KEY.len()] as usize) % 256;
        s.swap(i, j);
    }
    s
}

/// Encrypt or decrypt `data` in place with a single fresh keystream.
///
/// The cipher is an involution: applying it twice restores the input.
pub fn cipher(data: &mut [u8]) {
    let mut s = key_schedule();
    let mut i = 0usize;
    let mut j = 0usize;
    for byte in data.iter_mut() {
        i = (i + 1) % 256;
        j = (j + s[i] as usize) % 256;
        s.swap(i, j);
        let t = (s[i] as usize + s[j] as usize) % 256;
        *byte ^= s[t];
    }
}

/// Transform one block with a fresh key schedule. Intended for blocks of
/// [`BLOCK_SIZE`] bytes; a short final block uses the same fresh state.
pub fn cipher_block(block: &mut [u8]) {
    debug_assert!(block.len() <= BLOCK_SIZE);
    cipher(block);
}

/// Transform `data` in place, one independent 512-byte block at a time.
///
/// Each block gets a fresh cipher state, matching the boot ROM's
/// per-block decryption of loader stages.
pub fn cipher_blocks(data: &mut [u8]) {
    for block in data.chunks_mut(BLOCK_SIZE) {
        cipher_block(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_block_involution() {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, b) in block.iter_mut().enumerate() {
            *b = (i * 31) as u8;
        }
        let original = block;
        cipher_block(&mut block);
        assert_ne!(block, original);
        cipher_block(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn test_cipher_blocks_are_independent() {
        // Two identical plaintext blocks must produce identical ciphertext
        // blocks, since each block restarts the keystream.
        let mut data = vec![0x5Au8; 2 * BLOCK_SIZE];
        cipher_blocks(&mut data);
        let (first, second) = data.split_at(BLOCK_SIZE);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cipher_blocks_round_trip_odd_length() {
        let mut data: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
        let original = data.clone();
        cipher_blocks(&mut data);
        cipher_blocks(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_keystream_is_stable() {
        // The fixed key must always produce the same keystream; images
        // ciphered by older builds have to stay decodable.
        let mut block = [0u8; 4];
        cipher_block(&mut block);
        let again = {
            let mut b = [0u8; 4];
            cipher_block(&mut b);
            b
        };
        assert_eq!(block, again);
        assert_ne!(block, [0u8; 4]);
    }
}
