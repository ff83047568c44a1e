//! Launching the external decode backends.
//!
//! Every track is played from the stdout of a subprocess: `yt-dlp` for
//! anything an extractor understands, `ffmpeg` for raw HTTP files and radio
//! streams. [`spawn_primed`] only hands the stream over once the backend has
//! produced its first bytes, and those bytes are replayed through
//! [`StreamRelay`] so the consumer always sees the stream from the start.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    ffi::OsString,
    fmt,
    io::{self, Cursor, Read},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{config::Config, error::StreamStartError, sources::SourceKind, sources::Track};

/// Tamaño máximo del primer bloque leído del backend
const FIRST_CHUNK_SIZE: usize = 16 * 1024;

/// Máximo de stderr conservado para diagnóstico (se guarda el final)
const DIAGNOSTICS_LIMIT: usize = 8 * 1024;

/// Backend de decodificación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `yt-dlp` escribiendo el mejor audio disponible a stdout
    Extractor,
    /// `ffmpeg` re-codificando un stream HTTP a WAV 48 kHz estéreo
    Transcoder,
}

impl Backend {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::YouTube
            | SourceKind::SpotifyBridge
            | SourceKind::AppleMusicBridge
            | SourceKind::DeezerBridge
            | SourceKind::TidalBridge
            | SourceKind::SoundCloud
            | SourceKind::Bandcamp
            | SourceKind::Unknown => Self::Extractor,
            SourceKind::DirectHttp | SourceKind::Radio => Self::Transcoder,
        }
    }

    /// Extensión usada como pista de formato para el demuxer
    pub fn format_hint(self) -> &'static str {
        match self {
            Self::Extractor => "webm",
            Self::Transcoder => "wav",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractor => f.write_str("yt-dlp"),
            Self::Transcoder => f.write_str("ffmpeg"),
        }
    }
}

pub fn extractor_args(locator: &str, cookies: Option<&PathBuf>) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-f",
        "bestaudio[ext=webm]/bestaudio/best",
        "--no-playlist",
        "--quiet",
        "--no-warnings",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    if let Some(cookies) = cookies {
        args.push("--cookies".into());
        args.push(cookies.into());
    }

    args.extend(["-o", "-", "--", locator].map(OsString::from));
    args
}

pub fn transcoder_args(url: &str) -> Vec<OsString> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-i",
        url,
        "-vn",
        "-f",
        "wav",
        "-ar",
        "48000",
        "-ac",
        "2",
        "pipe:1",
    ]
    .map(OsString::from)
    .to_vec()
}

/// Lector que reproduce primero el bloque ya leído y después el resto del pipe
pub struct StreamRelay {
    primed: Cursor<Vec<u8>>,
    inner: Box<dyn Read + Send + Sync>,
}

impl StreamRelay {
    pub fn new(first_chunk: Vec<u8>, inner: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            primed: Cursor::new(first_chunk),
            inner,
        }
    }

    /// Relay sobre bytes en memoria, sin proceso detrás
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(bytes, Box::new(io::empty()))
    }
}

impl Read for StreamRelay {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.primed.read(buf)?;
        if n > 0 {
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

/// Handle compartido del subproceso activo.
///
/// `kill` never blocks: the signal is sent immediately and the child is
/// reaped on a blocking worker.
#[derive(Clone)]
pub struct ProcessHandle {
    child: Arc<Mutex<Option<Child>>>,
    killed: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("killed", &self.is_killed())
            .finish()
    }
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: Some(child.id()),
            child: Arc::new(Mutex::new(Some(child))),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle sin proceso real, para backends falsos en tests
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            child: Arc::new(Mutex::new(None)),
            killed: Arc::new(AtomicBool::new(false)),
            pid: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Termina el proceso; llamadas repetidas no tienen efecto
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }

        let Some(mut child) = self.child.lock().take() else {
            return;
        };

        if let Err(e) = child.kill() {
            // El proceso ya había terminado por su cuenta
            debug!("kill de pid {:?}: {}", self.pid, e);
        }
        reap(child);
    }

    /// Espera la salida del proceso tras cerrar stdout, matándolo si no sale a tiempo
    fn wait_exit(&self, grace: Duration) -> Option<ExitStatus> {
        let mut child = self.child.lock().take()?;
        self.killed.store(true, Ordering::SeqCst);

        let deadline = std::time::Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if std::time::Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(None) | Err(_) => {
                    let _ = child.kill();
                    return child.wait().ok();
                }
            }
        }
    }
}

fn reap(mut child: Child) {
    let wait = move || {
        let _ = child.wait();
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(wait);
        }
        Err(_) => {
            thread::spawn(wait);
        }
    }
}

/// Stderr del backend drenado en un hilo aparte
struct Diagnostics {
    buffer: Arc<Mutex<Vec<u8>>>,
    drain: Option<thread::JoinHandle<()>>,
}

impl Diagnostics {
    fn capture(stderr: Option<impl Read + Send + 'static>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let drain = stderr.map(|mut stderr| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut chunk = [0u8; 1024];
                while let Ok(n) = stderr.read(&mut chunk) {
                    if n == 0 {
                        break;
                    }
                    let mut buffer = buffer.lock();
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.len() > DIAGNOSTICS_LIMIT {
                        let excess = buffer.len() - DIAGNOSTICS_LIMIT;
                        buffer.drain(..excess);
                    }
                }
            })
        });

        Self { buffer, drain }
    }

    fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).trim().to_string()
    }

    /// Espera a que el proceso cierre stderr y devuelve todo lo capturado
    fn finish(mut self) -> String {
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
        self.snapshot()
    }
}

/// Stream listo para reproducir: bytes + proceso que los produce
pub struct PlayableStream {
    pub reader: StreamRelay,
    pub process: ProcessHandle,
    pub backend: Backend,
}

impl PlayableStream {
    pub fn format_hint(&self) -> &'static str {
        self.backend.format_hint()
    }
}

/// Crea el stream de audio de un track
#[async_trait]
pub trait StreamFactory: Send + Sync {
    async fn create_stream(&self, track: &Track) -> Result<PlayableStream, StreamStartError>;
}

/// Lanza el proceso y espera su primer bloque de salida.
///
/// Fails with `Spawn` if the process cannot start, `EarlyExit` if stdout
/// closes before any byte, and `Timeout` (after killing the process) if
/// nothing arrives within `timeout`.
pub async fn spawn_primed(
    mut command: Command,
    backend: Backend,
    timeout: Duration,
) -> Result<PlayableStream, StreamStartError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|source| StreamStartError::Spawn { backend, source })?;

    let stdout = child.stdout.take().ok_or_else(|| StreamStartError::Io {
        backend,
        source: io::Error::other("stdout no capturado"),
    })?;
    let diagnostics = Diagnostics::capture(child.stderr.take());
    let process = ProcessHandle::new(child);

    debug!("🚀 {} lanzado (pid {:?})", backend, process.pid());

    let first_read = tokio::task::spawn_blocking(move || {
        let mut stdout = stdout;
        let mut chunk = vec![0u8; FIRST_CHUNK_SIZE];
        let n = stdout.read(&mut chunk)?;
        chunk.truncate(n);
        Ok::<_, io::Error>((stdout, chunk))
    });

    let (stdout, chunk) = match tokio::time::timeout(timeout, first_read).await {
        Ok(Ok(Ok(read))) => read,
        Ok(Ok(Err(source))) => {
            process.kill();
            return Err(StreamStartError::Io { backend, source });
        }
        Ok(Err(join_error)) => {
            process.kill();
            return Err(StreamStartError::Io {
                backend,
                source: io::Error::other(join_error),
            });
        }
        Err(_) => {
            process.kill();
            let diagnostics = diagnostics.snapshot();
            warn!("⏱️ {} no produjo audio en {:?}", backend, timeout);
            return Err(StreamStartError::Timeout {
                backend,
                timeout,
                diagnostics,
            });
        }
    };

    if chunk.is_empty() {
        let waiter = process.clone();
        let (status, diagnostics) = tokio::task::spawn_blocking(move || {
            let status = waiter.wait_exit(Duration::from_millis(500));
            (status, diagnostics.finish())
        })
        .await
        .map_err(|e| StreamStartError::Io {
            backend,
            source: io::Error::other(e),
        })?;

        let status = status.map_or_else(|| "estado desconocido".to_string(), |s| s.to_string());
        warn!("💀 {} terminó sin producir audio ({})", backend, status);
        return Err(StreamStartError::EarlyExit {
            backend,
            status,
            diagnostics,
        });
    }

    debug!("🎚️ {} produjo {} bytes iniciales", backend, chunk.len());

    Ok(PlayableStream {
        reader: StreamRelay::new(chunk, Box::new(stdout)),
        process,
        backend,
    })
}

/// Fábrica de producción basada en `yt-dlp` y `ffmpeg`
#[derive(Debug, Clone)]
pub struct SubprocessStreamFactory {
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
    cookies: Option<PathBuf>,
    startup_timeout: Duration,
}

impl SubprocessStreamFactory {
    pub fn new(ytdlp: PathBuf, ffmpeg: PathBuf, cookies: Option<PathBuf>, startup_timeout: Duration) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            cookies,
            startup_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ytdlp_path.clone(),
            config.ffmpeg_path.clone(),
            config.cookies_file(),
            config.stream_startup_timeout(),
        )
    }

    fn command_for(&self, backend: Backend, locator: &str) -> Command {
        match backend {
            Backend::Extractor => {
                let mut command = Command::new(&self.ytdlp);
                command.args(extractor_args(locator, self.cookies.as_ref()));
                command
            }
            Backend::Transcoder => {
                let mut command = Command::new(&self.ffmpeg);
                command.args(transcoder_args(locator));
                command
            }
        }
    }
}

#[async_trait]
impl StreamFactory for SubprocessStreamFactory {
    async fn create_stream(&self, track: &Track) -> Result<PlayableStream, StreamStartError> {
        let backend = Backend::for_kind(track.source_kind());
        info!("🎵 Iniciando {} para: {}", backend, track.title());

        let command = self.command_for(backend, track.playable_locator());
        spawn_primed(command, backend, self.startup_timeout).await
    }
}
