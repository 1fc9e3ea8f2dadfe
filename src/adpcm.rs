// CallButton — IMA ADPCM Codec
//
// 16-bit PCM in, 4-bit codes out (two per byte, first sample in the high
// nibble). 4:1 compression for voice messages. The codec state must be
// freshly initialized for every independent stream; reusing state across
// streams corrupts the output.

/// IMA ADPCM step size table (89 entries).
const STEP_TABLE: [i16; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Step index adjustment, keyed by the 4-bit code.
const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Predictor state: previous reconstructed sample and step table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdpcmState {
    valprev: i16,
    index: i8,
}

impl AdpcmState {
    pub fn new() -> Self {
        Self { valprev: 0, index: 0 }
    }
}

impl Default for AdpcmState {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one PCM sample into a 4-bit code, advancing the predictor.
fn encode_sample(sample: i16, state: &mut AdpcmState) -> u8 {
    let mut step = STEP_TABLE[state.index as usize] as i32;
    let mut diff = sample as i32 - state.valprev as i32;
    let mut code: u8 = 0;

    if diff < 0 {
        code = 8;
        diff = -diff;
    }

    let mut vpdiff = step >> 3;

    if diff >= step {
        code |= 4;
        diff -= step;
        vpdiff += step;
    }
    step >>= 1;

    if diff >= step {
        code |= 2;
        diff -= step;
        vpdiff += step;
    }
    step >>= 1;

    if diff >= step {
        code |= 1;
        vpdiff += step;
    }

    let mut new_val = state.valprev as i32;
    if code & 8 != 0 {
        new_val -= vpdiff;
    } else {
        new_val += vpdiff;
    }
    state.valprev = new_val.clamp(-32768, 32767) as i16;

    state.index = (state.index + INDEX_TABLE[code as usize]).clamp(0, 88);

    code
}

/// Decode one 4-bit code into a PCM sample, advancing the predictor.
fn decode_sample(code: u8, state: &mut AdpcmState) -> i16 {
    let step = STEP_TABLE[state.index as usize] as i32;
    let mut vpdiff = step >> 3;

    if code & 4 != 0 {
        vpdiff += step;
    }
    if code & 2 != 0 {
        vpdiff += step >> 1;
    }
    if code & 1 != 0 {
        vpdiff += step >> 2;
    }

    let mut new_val = state.valprev as i32;
    if code & 8 != 0 {
        new_val -= vpdiff;
    } else {
        new_val += vpdiff;
    }
    state.valprev = new_val.clamp(-32768, 32767) as i16;

    state.index = (state.index + INDEX_TABLE[code as usize]).clamp(0, 88);

    state.valprev
}

/// Encode `pcm` into `out`, two samples per byte (first sample in the high
/// nibble). Returns the number of bytes written. `out` must hold at least
/// `(pcm.len() + 1) / 2` bytes.
pub fn encode(pcm: &[i16], out: &mut [u8], state: &mut AdpcmState) -> usize {
    let mut out_bytes = 0;

    for pair in pcm.chunks(2) {
        let code1 = encode_sample(pair[0], state);
        let code2 = if pair.len() > 1 {
            encode_sample(pair[1], state)
        } else {
            0
        };
        out[out_bytes] = (code1 << 4) | (code2 & 0x0F);
        out_bytes += 1;
    }

    out_bytes
}

/// Decode `samples` PCM samples from `adpcm` into `out`. Returns the number
/// of samples written.
pub fn decode(adpcm: &[u8], out: &mut [i16], samples: usize, state: &mut AdpcmState) -> usize {
    let in_bytes = (samples + 1) / 2;
    let mut out_samples = 0;

    for &byte in adpcm.iter().take(in_bytes) {
        out[out_samples] = decode_sample((byte >> 4) & 0x0F, state);
        out_samples += 1;

        if out_samples < samples {
            out[out_samples] = decode_sample(byte & 0x0F, state);
            out_samples += 1;
        }
    }

    out_samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, amplitude: f32, period: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let phase = (i % period) as f32 / period as f32 * core::f32::consts::TAU;
                (phase.sin() * amplitude) as i16
            })
            .collect()
    }

    #[test]
    fn encode_is_deterministic_with_fresh_state() {
        let pcm: Vec<i16> = (0..997).map(|i| ((i * 7919) % 65536 - 32768) as i16).collect();

        let mut out_a = vec![0u8; (pcm.len() + 1) / 2];
        let mut out_b = vec![0u8; (pcm.len() + 1) / 2];

        let n_a = encode(&pcm, &mut out_a, &mut AdpcmState::new());
        let n_b = encode(&pcm, &mut out_b, &mut AdpcmState::new());

        assert_eq!(n_a, n_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn decoder_tracks_encoder_reconstruction_exactly() {
        // The decoder's output must equal the encoder's own predicted
        // sequence sample-for-sample: both run the identical predictor.
        let pcm = sine(1024, 12_000.0, 160);

        let mut enc = AdpcmState::new();
        let mut reconstructed = Vec::with_capacity(pcm.len());
        for &s in &pcm {
            encode_sample(s, &mut enc);
            reconstructed.push(enc.valprev);
        }

        let mut packed = vec![0u8; (pcm.len() + 1) / 2];
        encode(&pcm, &mut packed, &mut AdpcmState::new());

        let mut decoded = vec![0i16; pcm.len()];
        let n = decode(&packed, &mut decoded, pcm.len(), &mut AdpcmState::new());

        assert_eq!(n, pcm.len());
        assert_eq!(decoded, reconstructed);
    }

    #[test]
    fn quantization_error_is_bounded_after_adaptation() {
        // A smooth low-amplitude signal stays within a small quantization
        // error once the step size has adapted (skip the attack transient).
        let pcm = sine(2048, 2000.0, 320);

        let mut packed = vec![0u8; (pcm.len() + 1) / 2];
        encode(&pcm, &mut packed, &mut AdpcmState::new());

        let mut decoded = vec![0i16; pcm.len()];
        decode(&packed, &mut decoded, pcm.len(), &mut AdpcmState::new());

        let max_err = pcm
            .iter()
            .zip(&decoded)
            .skip(64)
            .map(|(a, b)| (*a as i32 - *b as i32).abs())
            .max()
            .unwrap();
        assert!(max_err <= 256, "max quantization error {max_err} too large");
    }

    #[test]
    fn first_sample_lands_in_high_nibble() {
        // From zero state a large positive first sample yields code 7
        // (magnitude bits set, no sign bit).
        let mut out = [0u8; 1];
        encode(&[32_000], &mut out, &mut AdpcmState::new());
        assert_eq!(out[0] >> 4, 0x7);
        assert_eq!(out[0] & 0x0F, 0x0);
    }

    #[test]
    fn odd_sample_count_pads_low_nibble_with_zero() {
        let pcm = [500i16, -500, 500];
        let mut out = [0u8; 2];
        let n = encode(&pcm, &mut out, &mut AdpcmState::new());
        assert_eq!(n, 2);

        let mut decoded = [0i16; 3];
        let m = decode(&out, &mut decoded, 3, &mut AdpcmState::new());
        assert_eq!(m, 3);
    }

    #[test]
    fn state_reuse_across_streams_diverges() {
        // Carrying predictor state into an unrelated stream must not decode
        // the same as a fresh stream — this is why every recording
        // reinitializes the codec.
        let pcm = sine(256, 8000.0, 64);
        let mut packed = vec![0u8; 128];
        encode(&pcm, &mut packed, &mut AdpcmState::new());

        let mut stale = AdpcmState::new();
        let mut scratch = vec![0i16; 256];
        decode(&packed, &mut scratch, 256, &mut stale);

        let mut fresh_out = vec![0i16; 256];
        let mut stale_out = vec![0i16; 256];
        decode(&packed, &mut fresh_out, 256, &mut AdpcmState::new());
        decode(&packed, &mut stale_out, 256, &mut stale);

        assert_ne!(fresh_out, stale_out);
    }
}
