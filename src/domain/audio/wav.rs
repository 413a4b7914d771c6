//! WAV 容器 - PCM 头部写入与解析

use thiserror::Error;

use super::AudioSpec;

pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    #[error("Invalid WAV: {0}")]
    Invalid(String),

    #[error("audio data of {0} bytes does not fit in a WAV container")]
    TooLarge(u64),
}

/// 解析得到的 WAV 信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_size: u64,
    pub frames: u64,
    pub duration_ms: u64,
}

impl WavInfo {
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// 生成 PCM WAV 头部
pub fn encode_header(spec: &AudioSpec, data_len: u64) -> Result<[u8; WAV_HEADER_LEN], WavError> {
    // RIFF 大小字段为 u32，需扣除 36 字节头部
    if data_len > (u32::MAX - 36) as u64 {
        return Err(WavError::TooLarge(data_len));
    }
    let data_size = data_len as u32;
    let byte_rate = spec.byte_rate() as u32;
    let block_align = spec.block_align() as u16;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&spec.bits_per_sample.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    Ok(header)
}

fn le_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn le_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// 解析 WAV 头部
pub fn parse(data: &[u8]) -> Result<WavInfo, WavError> {
    if data.len() < WAV_HEADER_LEN {
        return Err(WavError::Invalid("data too short".to_string()));
    }
    if &data[0..4] != b"RIFF" {
        return Err(WavError::Invalid("missing RIFF header".to_string()));
    }
    if &data[8..12] != b"WAVE" {
        return Err(WavError::Invalid("missing WAVE identifier".to_string()));
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_size: Option<u64> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = le_u32(data, pos + 4) as usize;

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 || pos + 8 + 16 > data.len() {
                    return Err(WavError::Invalid("invalid fmt chunk".to_string()));
                }
                let body = pos + 8;
                fmt = Some((le_u16(data, body + 2), le_u32(data, body + 4), le_u16(data, body + 14)));
            }
            b"data" => {
                // 只信任文件中实际存在的字节
                let available = data.len().saturating_sub(pos + 8);
                data_size = Some(chunk_size.min(available) as u64);
                break;
            }
            _ => {}
        }

        pos += 8 + chunk_size;
        if chunk_size % 2 != 0 {
            pos += 1;
        }
    }

    let (channels, sample_rate, bits_per_sample) =
        fmt.ok_or_else(|| WavError::Invalid("missing fmt chunk".to_string()))?;
    let data_size = data_size.ok_or_else(|| WavError::Invalid("missing data chunk".to_string()))?;

    let block_align = channels as u64 * (bits_per_sample as u64 / 8);
    let frames = if block_align > 0 { data_size / block_align } else { 0 };
    let duration_ms = if sample_rate > 0 {
        frames * 1000 / sample_rate as u64
    } else {
        0
    };

    Ok(WavInfo {
        sample_rate,
        channels,
        bits_per_sample,
        data_size,
        frames,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parses_back() {
        let spec = AudioSpec::default();
        let data_len = spec.byte_rate() * 2;
        let mut wav = encode_header(&spec, data_len).unwrap().to_vec();
        wav.resize(WAV_HEADER_LEN + data_len as usize, 0);

        let info = parse(&wav).unwrap();
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.data_size, data_len);
        assert_eq!(info.duration_ms, 2000);
    }

    #[test]
    fn test_truncated_data_is_clamped() {
        let spec = AudioSpec::default();
        let mut wav = encode_header(&spec, 4000).unwrap().to_vec();
        wav.extend_from_slice(&[0u8; 40]);

        let info = parse(&wav).unwrap();
        assert_eq!(info.data_size, 40);
        assert_eq!(info.frames, 10);
    }

    #[test]
    fn test_empty_data_chunk() {
        let wav = encode_header(&AudioSpec::default(), 0).unwrap();
        let info = parse(&wav).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse(b"not a wav file at all, definitely not one!!!!").is_err());
        assert!(parse(b"RIFF").is_err());
    }
}
