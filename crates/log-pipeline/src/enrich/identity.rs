//! 식별(메타데이터) 서비스 조회
//!
//! 핸들 하나를 HTTP GET 쿼리 파라미터로 보내고 제목, 부서, 저자 메타데이터를 받습니다.
//!
//! 결과는 두 종류로 구분됩니다.
//! - `success == false` 응답: not-found. 레코드를 버리며 에러가 아닙니다.
//! - 네트워크 에러, 2xx 이외 상태, 해석할 수 없는 본문: [`LogPipelineError::Upstream`].
//!
//! [`IdentityCache`]는 한 번의 실행 동안 핸들별 응답을 기억하여 같은 핸들에 대한
//! 반복 호출을 한 번으로 줄입니다. not-found 응답은 기억하고 전송 실패는 기억하지 않습니다.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use oastats_core::metrics as m;
use oastats_core::types::{AuthorRef, Department};

use crate::error::LogPipelineError;

/// 식별 서비스 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResponse {
    /// 조회 성공 여부 (`false`면 not-found)
    #[serde(default)]
    pub success: bool,
    /// 문서 제목
    #[serde(default)]
    pub title: Option<String>,
    /// 문서의 안정적인 외부 식별자 (핸들 URI)
    #[serde(default)]
    pub uri: Option<String>,
    /// 소속 부서 (`null` 항목은 버림)
    #[serde(default, deserialize_with = "skip_null_departments")]
    pub departments: Option<Vec<Department>>,
    /// 저자 그룹 목록 (첫 번째 그룹이 레코드의 저자)
    #[serde(default)]
    pub ids: Option<Vec<Vec<AuthorRef>>>,
}

impl IdentityResponse {
    /// not-found 응답
    pub fn not_found() -> Self {
        Self::default()
    }

    /// 첫 번째 저자 그룹
    pub fn authors(&self) -> Vec<AuthorRef> {
        self.ids
            .as_ref()
            .and_then(|groups| groups.first())
            .cloned()
            .unwrap_or_default()
    }

    /// 부서 목록
    pub fn departments(&self) -> Vec<Department> {
        self.departments.clone().unwrap_or_default()
    }
}

fn skip_null_departments<'de, D>(deserializer: D) -> Result<Option<Vec<Department>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<Department>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|entries| entries.into_iter().flatten().collect()))
}

/// 식별 서비스 추상화
///
/// 실제 HTTP 클라이언트와 테스트용 mock 구현을 교체할 수 있게 합니다.
pub trait IdentityService: Send + Sync {
    /// 핸들에 대한 메타데이터를 조회합니다.
    ///
    /// # Errors
    ///
    /// 전송 계층 실패 시 `LogPipelineError::Upstream`을 반환합니다.
    /// not-found는 에러가 아니라 `success == false` 응답입니다.
    fn fetch(
        &self,
        handle: &str,
    ) -> impl Future<Output = Result<IdentityResponse, LogPipelineError>> + Send;
}

/// reqwest 기반 식별 서비스 클라이언트
pub struct HttpIdentityService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIdentityService {
    /// 엔드포인트와 요청 타임아웃으로 클라이언트를 생성합니다.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LogPipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LogPipelineError::Config {
                field: "pipeline.identity_service".to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl IdentityService for HttpIdentityService {
    async fn fetch(&self, handle: &str) -> Result<IdentityResponse, LogPipelineError> {
        let upstream = |reason: String| LogPipelineError::Upstream {
            handle: handle.to_owned(),
            reason,
        };

        let started = Instant::now();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("handle", handle)])
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| upstream(e.to_string()))?;
        let body = response
            .json::<IdentityResponse>()
            .await
            .map_err(|e| upstream(format!("invalid response body: {e}")))?;
        histogram!(m::IDENTITY_REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        Ok(body)
    }
}

/// 실행 단위 메모이제이션 캐시
///
/// 파이프라인 하나가 소유하며 실행이 끝나면 함께 버려집니다.
/// 크기 제한이 없습니다 (키 공간은 로그에 나타난 핸들 수로 제한됨).
pub struct IdentityCache<S> {
    service: S,
    entries: HashMap<String, Arc<IdentityResponse>>,
    hits: u64,
    misses: u64,
}

impl<S: IdentityService> IdentityCache<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// 핸들을 조회합니다. 이미 조회한 핸들은 서비스를 다시 호출하지 않습니다.
    pub async fn lookup(&mut self, handle: &str) -> Result<Arc<IdentityResponse>, LogPipelineError> {
        if let Some(found) = self.entries.get(handle) {
            self.hits += 1;
            counter!(m::IDENTITY_CACHE_HITS_TOTAL).increment(1);
            return Ok(Arc::clone(found));
        }

        self.misses += 1;
        counter!(m::IDENTITY_CACHE_MISSES_TOTAL).increment(1);
        let response = Arc::new(self.service.fetch(handle).await?);
        debug!(handle, success = response.success, "identity lookup");
        self.entries.insert(handle.to_owned(), Arc::clone(&response));
        Ok(response)
    }

    /// 캐시된 핸들 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// 캐시를 비웁니다.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

#[cfg(test)]
pub use mock::MockIdentityService;


#[cfg(test)]
mod tests {
    use super::*;

    fn found(title: &str) -> IdentityResponse {
        IdentityResponse {
            success: true,
            title: Some(title.to_owned()),
            uri: Some("http://hdl.handle.net/1721.1/22774".to_owned()),
            departments: Some(vec![Department::new("Physics", "Department of Physics")]),
            ids: Some(vec![
                vec![AuthorRef::new("1", "First, A.")],
                vec![AuthorRef::new("2", "Second, B.")],
            ]),
        }
    }

    #[test]
    fn response_parses_service_json() {
        let json = r#"{
            "success": true,
            "title": "On Things",
            "uri": "http://hdl.handle.net/1721.1/22774",
            "departments": [{"canonical": "Physics", "display": "Dept. of Physics"}],
            "ids": [[{"mitid": "123", "name": "Smith, J."}], [{"mitid": "456", "name": "Doe, J."}]]
        }"#;
        let resp: IdentityResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.authors(), vec![AuthorRef::new("123", "Smith, J.")]);
        assert_eq!(resp.departments()[0].canonical_name, "Physics");
    }

    #[test]
    fn failure_response_parses_without_optional_fields() {
        let resp: IdentityResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!resp.success);
        assert!(resp.authors().is_empty());
        assert!(resp.departments().is_empty());
    }

    #[test]
    fn null_department_entries_are_dropped() {
        let json = r#"{
            "success": true,
            "uri": "http://hdl.handle.net/1721.1/22774",
            "departments": [null, {"canonical": "Physics", "display": "Dept. of Physics"}, null],
            "ids": [[{"mitid": "1", "name": "A"}]]
        }"#;
        let resp: IdentityResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            resp.departments(),
            vec![Department::new("Physics", "Dept. of Physics")]
        );
        assert_eq!(resp.authors().len(), 1);

        let resp: IdentityResponse =
            serde_json::from_str(r#"{"success": true, "departments": null}"#).unwrap();
        assert!(resp.departments().is_empty());
    }

    #[test]
    fn authors_are_first_group_only() {
        assert_eq!(found("t").authors().len(), 1);
        assert_eq!(found("t").authors()[0].id, "1");
    }

    #[tokio::test]
    async fn same_handle_fetched_once() {
        let service = MockIdentityService::new().with_response("1721.1/22774", found("T"));
        let mut cache = IdentityCache::new(service);

        let a = cache.lookup("1721.1/22774").await.unwrap();
        let b = cache.lookup("1721.1/22774").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(cache.service().calls(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_memoized() {
        let mut cache = IdentityCache::new(MockIdentityService::new());
        assert!(!cache.lookup("1721.1/1").await.unwrap().success);
        assert!(!cache.lookup("1721.1/1").await.unwrap().success);
        assert_eq!(cache.service().calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_not_memoized() {
        let mut cache = IdentityCache::new(MockIdentityService::new().with_failure("1721.1/9"));
        let err = cache.lookup("1721.1/9").await.unwrap_err();
        assert!(matches!(err, LogPipelineError::Upstream { .. }));
        assert!(cache.lookup("1721.1/9").await.is_err());
        assert_eq!(cache.service().calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let service = MockIdentityService::new().with_response("h", found("T"));
        let mut cache = IdentityCache::new(service);
        cache.lookup("h").await.unwrap();
        cache.clear();
        cache.lookup("h").await.unwrap();
        assert_eq!(cache.service().calls(), 2);
    }

    #[tokio::test]
    async fn http_service_reports_connection_failure_as_upstream() {
        // 포트 1은 열려 있지 않아 연결이 즉시 거부됨
        let service =
            HttpIdentityService::new("http://127.0.0.1:1/ws/oastats", Duration::from_secs(2))
                .unwrap();
        let err = service.fetch("1721.1/22774").await.unwrap_err();
        assert!(matches!(err, LogPipelineError::Upstream { .. }));
    }
}
