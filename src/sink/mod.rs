//! 레코드 출력 모듈
//!
//! 규칙 엔진이 만든 WriteRecord를 저장소로 보냅니다.
//!
//! # Example
//!
//! ```ignore
//! use mqtt2influx::sink::{InfluxSink, RecordSink};
//!
//! let sink = InfluxSink::new("http://localhost:8086", "home", 5000)?;
//! sink.write(&record).await?;
//! ```

mod influx;

pub use influx::{InfluxSink, RetryConfig};

use std::future::Future;

use tracing::info;

use crate::error::SinkError;
use crate::transformer::{LineProtocolFormatter, WriteRecord};

/// 레코드 저장소
///
/// 실패는 호출자에게 반환되며, 엔진은 이를 로그로 남기고 다음 레코드를 처리합니다.
pub trait RecordSink: Send + Sync {
    /// 레코드 하나 쓰기
    fn write(&self, record: &WriteRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// 레코드를 로그로만 출력하는 싱크
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    formatter: LineProtocolFormatter,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for LogSink {
    async fn write(&self, record: &WriteRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(record)?;
        info!(line = %line, "Record");
        Ok(())
    }
}

/// 바이너리에서 사용하는 싱크 선택
#[derive(Debug, Clone)]
pub enum Sink {
    Influx(InfluxSink),
    Log(LogSink),
}

impl Sink {
    /// 싱크 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Sink::Influx(_) => "influxdb",
            Sink::Log(_) => "log",
        }
    }
}

impl RecordSink for Sink {
    async fn write(&self, record: &WriteRecord) -> Result<(), SinkError> {
        match self {
            Sink::Influx(sink) => sink.write(record).await,
            Sink::Log(sink) => sink.write(record).await,
        }
    }
}
