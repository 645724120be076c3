//! Потребители входящих треков: слив или запись на диск

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

type BoxedWriter = Box<dyn Writer + Send>;

/// Сколько ждём завершения чтения треков после закрытия peer connection
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Куда отдаются треки, пришедшие от удалённой стороны
#[async_trait]
pub trait TrackSink: Send + Sync {
    fn attach(&self, track: Arc<TrackRemote>);

    /// Дожидается конца всех треков и закрывает записи
    async fn finish(&self) -> Vec<TrackStats> {
        Vec::new()
    }
}

/// Счётчики по одному треку
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Задачи чтения треков, запущенные sink'ом
#[derive(Debug, Default)]
pub struct Pumps {
    handles: Mutex<Vec<JoinHandle<TrackStats>>>,
}

impl Pumps {
    pub fn push(&self, handle: JoinHandle<TrackStats>) {
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
    }

    /// Ждёт все задачи не дольше `limit`; оставшиеся прерываются
    pub async fn finish(&self, limit: Duration) -> Vec<TrackStats> {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return Vec::new(),
        };

        let deadline = tokio::time::Instant::now() + limit;
        let mut stats = Vec::with_capacity(handles.len());
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(s)) => stats.push(s),
                Ok(Err(e)) => warn!("Track reader failed: {}", e),
                Err(_) => {
                    warn!("Track reader still running after {:?}, aborting", limit);
                    handle.abort();
                }
            }
        }
        stats
    }
}

/// Читает RTP и выбрасывает его, считая пакеты
#[derive(Debug, Default)]
pub struct DrainSink {
    pumps: Pumps,
}

#[async_trait]
impl TrackSink for DrainSink {
    fn attach(&self, track: Arc<TrackRemote>) {
        self.pumps.push(tokio::spawn(pump(track, None)));
    }

    async fn finish(&self) -> Vec<TrackStats> {
        self.pumps.finish(FINISH_TIMEOUT).await
    }
}

/// Файлы для записи; пустой конфиг = только слив
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// VP8 → IVF
    pub video: Option<PathBuf>,
    /// Opus → OGG
    pub audio: Option<PathBuf>,
}

impl RecorderConfig {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Пишет первый видео- и первый аудиотрек в файлы
pub struct RecorderSink {
    config: RecorderConfig,
    // на каждый вид медиа пишем не больше одного трека
    claimed: Mutex<Vec<RTPCodecType>>,
    pumps: Pumps,
}

impl RecorderSink {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            claimed: Mutex::new(Vec::new()),
            pumps: Pumps::default(),
        }
    }

    fn claim(&self, kind: RTPCodecType) -> bool {
        match self.claimed.lock() {
            Ok(mut claimed) if !claimed.contains(&kind) => {
                claimed.push(kind);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TrackSink for RecorderSink {
    fn attach(&self, track: Arc<TrackRemote>) {
        let kind = track.kind();
        let mime = track.codec().capability.mime_type;

        let writer = if self.claim(kind) {
            match open_writer(kind, &mime, &self.config) {
                Ok(writer) => writer,
                Err(e) => {
                    warn!("Cannot record {:?} track: {}", kind, e);
                    None
                }
            }
        } else {
            None
        };

        if writer.is_none() {
            debug!("Track {} ({}) will be drained", track.id(), mime);
        }
        self.pumps.push(tokio::spawn(pump(track, writer)));
    }

    async fn finish(&self) -> Vec<TrackStats> {
        self.pumps.finish(FINISH_TIMEOUT).await
    }
}

/// Открывает writer под кодек трека; `None`, если запись не настроена или кодек не подходит
pub fn open_writer(
    kind: RTPCodecType,
    mime: &str,
    config: &RecorderConfig,
) -> Result<Option<BoxedWriter>> {
    match kind {
        RTPCodecType::Video => match &config.video {
            Some(path) if mime.eq_ignore_ascii_case(MIME_TYPE_VP8) => {
                Ok(Some(Box::new(ivf_writer(path)?)))
            }
            Some(_) => {
                warn!("Video codec {} cannot be recorded to IVF", mime);
                Ok(None)
            }
            None => Ok(None),
        },
        RTPCodecType::Audio => match &config.audio {
            Some(path) if mime.eq_ignore_ascii_case(MIME_TYPE_OPUS) => {
                let writer = OggWriter::new(File::create(path)?, 48000, 2)
                    .map_err(|e| Error::Media(e.to_string()))?;
                info!("Recording audio to {}", path.display());
                Ok(Some(Box::new(writer)))
            }
            Some(_) => {
                warn!("Audio codec {} cannot be recorded to OGG", mime);
                Ok(None)
            }
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn ivf_writer(path: &Path) -> Result<IVFWriter<File>> {
    let header = IVFFileHeader {
        signature: *b"DKIF",
        version: 0,
        header_size: 32,
        four_cc: *b"VP80",
        width: 640,
        height: 480,
        timebase_denominator: 30,
        timebase_numerator: 1,
        num_frames: 900,
        unused: 0,
    };
    let writer =
        IVFWriter::new(File::create(path)?, &header).map_err(|e| Error::Media(e.to_string()))?;
    info!("Recording video to {}", path.display());
    Ok(writer)
}

/// Читает RTP до конца трека; пакеты пишет в `writer`, если он есть
async fn pump(track: Arc<TrackRemote>, mut writer: Option<BoxedWriter>) -> TrackStats {
    let mut stats = TrackStats::default();
    info!(
        "Track {} started: kind={:?} ssrc={}",
        track.id(),
        track.kind(),
        track.ssrc()
    );

    while let Ok((packet, _)) = track.read_rtp().await {
        stats.packets += 1;
        stats.bytes += packet.payload.len() as u64;

        if let Some(w) = writer.as_mut() {
            if let Err(e) = w.write_rtp(&packet) {
                warn!("Recording of track {} stopped: {}", track.id(), e);
                writer = None;
            }
        }
    }

    if let Some(mut w) = writer {
        if let Err(e) = w.close() {
            warn!("Failed to finalize recording: {}", e);
        }
    }

    info!(
        "Track {} ended: {} packets, {} bytes",
        track.id(),
        stats.packets,
        stats.bytes
    );
    stats
}
