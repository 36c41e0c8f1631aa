use std::path::{Path, PathBuf};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tempo_orbit_core::{PcmBuffer, PcmSource, Result, TempoOrbitError};

/// PCM source backed by an audio file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PcmSource for FileSource {
    fn decode(&mut self) -> Result<PcmBuffer> {
        decode_file(&self.path)
    }
}

/// Decodes the first audio track of `path`, keeping channels separate.
pub fn decode_file(path: &Path) -> Result<PcmBuffer> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(decode_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TempoOrbitError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let declared_channels = track.codec_params.channels.map(|c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| TempoOrbitError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut decoded_channels: Option<usize> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_error(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::debug!(err, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();
        match decoded_channels {
            None => decoded_channels = Some(packet_channels),
            Some(channels) if channels != packet_channels => {
                return Err(TempoOrbitError::Decode(format!(
                    "channel count changed from {channels} to {packet_channels} mid-stream"
                )));
            }
            Some(_) => {}
        }

        let mut samples = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(samples.samples());
    }

    // Packets carry the authoritative layout; containers may omit it.
    let channels = decoded_channels.or(declared_channels).unwrap_or(1);
    let pcm = PcmBuffer::from_interleaved(&interleaved, channels, sample_rate);
    tracing::info!(
        path = %path.display(),
        channels,
        sample_rate,
        seconds = pcm.duration_seconds(),
        "decoded audio"
    );
    Ok(pcm)
}

fn decode_error(err: SymphoniaError) -> TempoOrbitError {
    TempoOrbitError::Decode(err.to_string())
}
