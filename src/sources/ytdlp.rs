use anyhow::Context;
use async_process::Command;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serenity::model::id::UserId;
use songbird::input::{HttpRequest, Input};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info, warn};
use url::Url;

use super::TrackResolver;
use crate::{
    audio::track::{StreamSource, Track, TrackInfo},
    error::{ResolutionError, VoiceConnectionError},
};

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub binary: String,
    pub concurrency: usize,
    pub max_duration: Duration,
    pub allow_live: bool,
    /// Tiempo máximo de una extracción; el proceso se mata al vencer.
    pub timeout: Duration,
}

/// Resolvedor basado en yt-dlp: búsquedas de texto o URLs directas.
pub struct YtDlpResolver {
    settings: ResolverSettings,
    client: reqwest::Client,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    is_live: Option<bool>,
    #[serde(default)]
    formats: Vec<Format>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: String,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl YtDlpInfo {
    /// URL del formato elegido; si falta, la del primer formato listado.
    fn stream(&self) -> Option<(&str, &HashMap<String, String>)> {
        if let Some(url) = self.url.as_deref() {
            return Some((url, &self.http_headers));
        }
        self.formats
            .first()
            .map(|format| (format.url.as_str(), &format.http_headers))
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

impl YtDlpResolver {
    pub fn new(client: reqwest::Client, settings: ResolverSettings) -> Self {
        Self {
            rate_limiter: Semaphore::new(settings.concurrency.max(1)),
            settings,
            client,
        }
    }

    /// Verifica que yt-dlp se pueda ejecutar y devuelve su versión.
    pub async fn health_check(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.settings.binary)
            .arg("--version")
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// URLs http(s) se pasan tal cual; todo lo demás es una búsqueda.
    fn search_target(query: &str) -> String {
        let query = query.trim();
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
            _ => format!("ytsearch1:{query}"),
        }
    }

    async fn fetch(&self, query: &str) -> Result<YtDlpInfo, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Backend(e.to_string()))?;

        let target = Self::search_target(query);
        info!("🔍 Buscando con yt-dlp: {}", target);

        let mut command = Command::new(&self.settings.binary);
        command
            .args([
                "-f",
                "bestaudio",
                "--no-playlist",
                "--no-check-certificates",
                "--no-warnings",
                "--quiet",
                "--socket-timeout",
                "15",
                "--dump-json",
                target.as_str(),
            ])
            .kill_on_drop(true);

        // al vencer se suelta el future, lo que mata el proceso y libera el permiso
        let output = timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| {
                warn!("⏱️ yt-dlp no respondió en {:?}: {}", self.settings.timeout, target);
                ResolutionError::Backend(format!(
                    "yt-dlp no respondió en {}",
                    humantime::format_duration(self.settings.timeout)
                ))
            })??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Backend(error.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // ytsearch1 imprime un JSON por línea; sin líneas no hubo resultados
        let Some(line) = stdout.lines().find(|line| !line.trim().is_empty()) else {
            return Err(ResolutionError::NoResults(query.to_string()));
        };

        Ok(serde_json::from_str(line)?)
    }

    fn check_allowed(&self, info: &YtDlpInfo) -> Result<(), ResolutionError> {
        if info.is_live.unwrap_or(false) && !self.settings.allow_live {
            return Err(ResolutionError::Disallowed(format!(
                "`{}` es una transmisión en vivo",
                info.title
            )));
        }

        if let Some(duration) = info.duration() {
            if duration > self.settings.max_duration {
                return Err(ResolutionError::Disallowed(format!(
                    "`{}` dura {} (máximo {})",
                    info.title,
                    humantime::format_duration(Duration::from_secs(duration.as_secs())),
                    humantime::format_duration(self.settings.max_duration),
                )));
            }
        }

        Ok(())
    }

    fn build_track(&self, info: YtDlpInfo, requested_by: UserId) -> Result<Track, ResolutionError> {
        self.check_allowed(&info)?;

        let (stream_url, headers) = info
            .stream()
            .ok_or_else(|| ResolutionError::Backend(format!("`{}` sin URL de audio", info.title)))?;
        let stream = HttpStream::new(self.client.clone(), stream_url, header_map(headers));

        let source_url = info
            .webpage_url
            .clone()
            .unwrap_or_else(|| stream_url.to_string());
        let mut track_info = TrackInfo::new(info.title.clone(), source_url, requested_by);
        if let Some(duration) = info.duration() {
            track_info = track_info.with_duration(duration);
        }

        Ok(Track::new(track_info, stream))
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError> {
        let info = self.fetch(query).await?;
        let track = self.build_track(info, requested_by)?;
        debug!("✅ Resuelto: {}", track.info().title);
        Ok(track)
    }
}

/// Converts yt-dlp's `http_headers` into a reqwest header map, skipping
/// anything that is not a valid header.
fn header_map(raw: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("⚠️ Header de yt-dlp ignorado: {}", name),
        }
    }
    headers
}

/// Stream HTTP perezoso: no abre la conexión hasta que el motor lo reproduce.
pub struct HttpStream {
    request: Option<HttpRequest>,
}

impl HttpStream {
    pub fn new(client: reqwest::Client, url: &str, headers: HeaderMap) -> Self {
        Self {
            request: Some(HttpRequest::new_with_headers(client, url.to_string(), headers)),
        }
    }
}

impl StreamSource for HttpStream {
    fn open(&mut self) -> Result<Input, VoiceConnectionError> {
        self.request
            .take()
            .map(Input::from)
            .ok_or_else(|| VoiceConnectionError::Stream("stream ya entregado".into()))
    }

    fn release(&mut self) {
        self.request = None;
    }
}
