//! InfluxDB HTTP 싱크
//!
//! Connection pooling, 타임아웃, 재시도를 지원하는 v1 `/write` API 클라이언트입니다.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument, warn};
use url::Url;

use super::RecordSink;
use crate::config::InfluxConfig;
use crate::error::SinkError;
use crate::transformer::{LineProtocolFormatter, WriteRecord};

/// 재시도 설정
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수
    pub max_retries: u32,
    /// 초기 지연 시간
    pub initial_delay: Duration,
    /// 최대 지연 시간
    pub max_delay: Duration,
    /// 지연 시간 증가 배수
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// InfluxDB 싱크
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    auth: Option<(String, String)>,
    formatter: LineProtocolFormatter,
    retry: RetryConfig,
}

impl InfluxSink {
    /// 새 싱크 생성
    ///
    /// # Arguments
    /// * `base_url` - InfluxDB 서버 URL (예: "http://localhost:8086")
    /// * `database` - 대상 데이터베이스
    /// * `timeout_ms` - 요청 타임아웃 (밀리초)
    pub fn new(base_url: &str, database: &str, timeout_ms: u64) -> Result<Self, SinkError> {
        let raw = format!("{}/write", base_url.trim_end_matches('/'));
        let mut write_url = Url::parse(&raw).map_err(|e| SinkError::InvalidUrl {
            url: base_url.to_string(),
            source: e,
        })?;
        write_url.query_pairs_mut().append_pair("db", database);

        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(SinkError::HttpClientInit)?;

        Ok(Self {
            client,
            write_url,
            auth: None,
            formatter: LineProtocolFormatter::new(),
            retry: RetryConfig::default(),
        })
    }

    /// 설정 파일의 `influxdb` 섹션으로 생성
    pub fn from_config(config: &InfluxConfig) -> Result<Self, SinkError> {
        let mut sink = Self::new(&config.url, &config.database, config.timeout_ms)?
            .with_retry(RetryConfig {
                max_retries: config.max_retries,
                ..RetryConfig::default()
            });

        if let Some(username) = &config.username {
            sink = sink.with_auth(username, config.password.as_deref().unwrap_or(""));
        }

        Ok(sink)
    }

    /// Basic Auth 설정
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some((username.to_string(), password.to_string()));
        self
    }

    /// 재시도 설정 변경
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 쓰기 엔드포인트
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// 라인 프로토콜 본문 한 번 전송
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn send_lines(&self, body: String) -> Result<(), SinkError> {
        debug!("Sending InfluxDB write request");

        let mut req = self.client.post(self.write_url.clone()).body(body);

        if let Some((username, password)) = &self.auth {
            req = req.basic_auth(username, Some(password));
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// 재시도 로직이 포함된 전송
    pub async fn send_lines_with_retry(&self, body: String) -> Result<(), SinkError> {
        let config = &self.retry;
        let mut delay = config.initial_delay;
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            match self.send_lines(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    last_error = Some(e);

                    if attempt < config.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Write failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay = std::cmp::min(
                            Duration::from_secs_f64(delay.as_secs_f64() * config.multiplier),
                            config.max_delay,
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or(SinkError::MaxRetriesExceeded))
    }

    /// 여러 레코드 일괄 쓰기
    pub async fn write_batch(&self, records: &[WriteRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let body = self.formatter.format_batch(records)?;
        self.send_lines_with_retry(body).await
    }
}

impl RecordSink for InfluxSink {
    async fn write(&self, record: &WriteRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(record)?;
        self.send_lines_with_retry(line).await
    }
}
