//! 설정 저장소 — 현재 설정 문서를 보관하고 변경 시 파일에 기록
//!
//! [`ConfigStore`]는 파이프라인이 매 동작마다 호출하는 설정 접근자입니다.
//! 읽기는 동기 함수이며 항상 최신 문서를 반환합니다. 쓰기(`update`,
//! `set_running`)는 직렬화되어 한 번에 하나씩 파일에 반영됩니다.
//!
//! 파일 기록은 임시 파일에 먼저 쓴 뒤 rename 하므로, 기록 도중 프로세스가
//! 종료되어도 이전 문서가 손상되지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info};

use crate::config::{ConfigPatch, PipelineConfig, Syslog2CefConfig};
use crate::error::Syslog2CefError;

/// 설정 문서 저장소
pub struct ConfigStore {
    /// 영속화 경로 (`None`이면 메모리 전용)
    path: Option<PathBuf>,
    /// 현재 문서
    current: RwLock<Syslog2CefConfig>,
    /// 쓰기 직렬화용 락
    write_lock: tokio::sync::Mutex<()>,
}

impl ConfigStore {
    /// 파일 없이 메모리에만 존재하는 저장소를 생성합니다.
    pub fn in_memory(config: Syslog2CefConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 파일 기반 저장소를 엽니다.
    ///
    /// 파일이 없으면 기본값으로 시작하며, 첫 쓰기 시점에 파일이 생성됩니다.
    /// 파일이 있으면 파싱 후 환경변수 오버라이드를 적용하고 검증합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Syslog2CefError> {
        let path = path.as_ref().to_path_buf();

        let mut config = match tokio::fs::try_exists(&path).await {
            Ok(true) => Syslog2CefConfig::from_file(&path).await?,
            Ok(false) => {
                info!(path = %path.display(), "config file not found, using defaults");
                Syslog2CefConfig::default()
            }
            Err(e) => return Err(Syslog2CefError::Io(e)),
        };
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self {
            path: Some(path),
            current: RwLock::new(config),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// 영속화 경로를 반환합니다.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 현재 문서의 복사본을 반환합니다.
    pub fn snapshot(&self) -> Syslog2CefConfig {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 현재 입력/출력 스냅샷을 반환합니다.
    pub fn pipeline(&self) -> PipelineConfig {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .pipeline()
    }

    /// 영속화된 실행 플래그를 반환합니다.
    pub fn is_running(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .running
    }

    /// 패치를 적용하고 저장한 뒤 새 문서를 반환합니다.
    ///
    /// 검증에 실패하면 파일과 메모리 모두 변경되지 않습니다.
    pub async fn update(&self, patch: &ConfigPatch) -> Result<Syslog2CefConfig, Syslog2CefError> {
        let _guard = self.write_lock.lock().await;

        let next = self.snapshot().normalize(patch)?;
        self.persist(&next).await?;

        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next.clone();
        debug!(running = next.running, "config updated");
        Ok(next)
    }

    /// 실행 플래그를 저장합니다.
    pub async fn set_running(&self, running: bool) -> Result<(), Syslog2CefError> {
        let patch = ConfigPatch {
            running: Some(running),
            ..Default::default()
        };
        self.update(&patch).await.map(|_| ())
    }

    async fn persist(&self, config: &Syslog2CefConfig) -> Result<(), Syslog2CefError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let body = config.to_toml()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("running", &self.is_running())
            .finish()
    }
}
