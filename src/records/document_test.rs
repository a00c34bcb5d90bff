use super::*;

fn backend() -> DocumentBackend {
    DocumentBackend::new("https://docs.example".into(), "proj-1".into(), "key".into()).unwrap()
}

#[test]
fn project_url_is_scoped() {
    assert_eq!(backend().project_url(), "https://docs.example/v1/projects/proj-1");
}

#[test]
fn documents_url_nests_collection() {
    assert_eq!(
        backend().documents_url("creators"),
        "https://docs.example/v1/projects/proj-1/collections/creators/documents"
    );
}
