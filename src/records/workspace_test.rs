use super::*;

fn backend() -> WorkspaceBackend {
    WorkspaceBackend::new("https://ws.example/api/".into(), "tok".into(), "2024-05-01".into()).unwrap()
}

#[test]
fn query_url_targets_the_database() {
    assert_eq!(backend().query_url("db-42"), "https://ws.example/api/databases/db-42/query");
}

#[test]
fn page_url_targets_the_page() {
    assert_eq!(backend().page_url("p-7"), "https://ws.example/api/pages/p-7");
}

#[test]
fn trailing_slash_is_normalized() {
    let backend = WorkspaceBackend::new("https://ws.example///".into(), "t".into(), "v".into()).unwrap();
    assert_eq!(backend.page_url("p"), "https://ws.example/pages/p");
}
