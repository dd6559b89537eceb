//! `S3Client` request shape and response handling against a mock endpoint.

use chimera_harness::s3::{Credentials, S3Client, S3Config, S3Error, SignatureVersion};
use chimera_harness::{ScenarioError, ScenarioTest};
use mockito::{Matcher, Server, ServerGuard};

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn client_for(server: &ServerGuard, signature: SignatureVersion) -> S3Client {
    let config = S3Config::new(server.url(), Credentials::new("myaccessid", "mysecretkey"))
        .with_signature(signature);
    S3Client::new(config).unwrap()
}

#[test]
fn test_put_signed_with_v4() {
    let mut server = Server::new();
    let mock = server
        .mock("PUT", "/mybucket/dir/hello.txt")
        .match_header(
            "authorization",
            Matcher::Regex(
                r"^AWS4-HMAC-SHA256 Credential=myaccessid/\d{8}/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature=[0-9a-f]{64}$"
                    .to_string(),
            ),
        )
        .match_header("x-amz-content-sha256", HELLO_SHA256)
        .match_header("x-amz-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".to_string()))
        .match_body("hello")
        .with_status(200)
        .create();

    let client = client_for(&server, SignatureVersion::V4);
    client
        .put_object("mybucket", "dir/hello.txt", b"hello".to_vec())
        .unwrap();
    mock.assert();
}

#[test]
fn test_put_signed_with_v2() {
    let mut server = Server::new();
    let mock = server
        .mock("PUT", "/mybucket/key")
        .match_header(
            "authorization",
            Matcher::Regex(r"^AWS myaccessid:[A-Za-z0-9+/]{27}=$".to_string()),
        )
        .match_header("date", Matcher::Regex(r"GMT$".to_string()))
        .match_header("x-amz-date", Matcher::Missing)
        .with_status(200)
        .create();

    let client = client_for(&server, SignatureVersion::V2);
    client.put_object("mybucket", "key", vec![0u8; 16]).unwrap();
    mock.assert();
}

#[test]
fn test_ranged_get_sends_range_header() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/mybucket/key")
        .match_header("range", "bytes=1000-1599")
        .with_status(206)
        .with_header("content-range", "bytes 1000-1599/4096")
        .with_body(vec![b'x'; 600])
        .create();

    let client = client_for(&server, SignatureVersion::V4);
    let output = client.get_object("mybucket", "key", Some((1000, 1599))).unwrap();

    assert_eq!(output.body.len(), 600);
    assert_eq!(output.content_range.as_deref(), Some("bytes 1000-1599/4096"));
    mock.assert();
}

#[test]
fn test_head_missing_object_is_not_found() {
    let mut server = Server::new();
    let _mock = server.mock("HEAD", "/mybucket/gone").with_status(404).create();

    let client = client_for(&server, SignatureVersion::V4);
    let err = client.head_object("mybucket", "gone").unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert!(err.is_not_found());
}

#[test]
fn test_delete_accepts_no_content() {
    let mut server = Server::new();
    let mock = server.mock("DELETE", "/mybucket/key").with_status(204).create();

    let client = client_for(&server, SignatureVersion::V2);
    client.delete_object("mybucket", "key").unwrap();
    mock.assert();
}

#[test]
fn test_list_sends_query_and_parses_result() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/mybucket")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("list-type".to_string(), "2".to_string()),
            Matcher::UrlEncoded("prefix".to_string(), "mydir1/".to_string()),
            Matcher::UrlEncoded("delimiter".to_string(), "/".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/xml")
        .with_body(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>mybucket</Name>
  <Prefix>mydir1/</Prefix>
  <KeyCount>3</KeyCount>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>mydir1/top</Key><Size>4096</Size></Contents>
  <CommonPrefixes><Prefix>mydir1/mydir2/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>mydir1/mydir3/</Prefix></CommonPrefixes>
</ListBucketResult>"#,
        )
        .create();

    let client = client_for(&server, SignatureVersion::V4);
    let listing = client
        .list_objects_v2("mybucket", Some("mydir1/"), Some("/"))
        .unwrap();

    assert_eq!(listing.key_count, 3);
    assert_eq!(listing.keys.len(), 1);
    assert_eq!(listing.keys[0].key, "mydir1/top");
    assert_eq!(listing.keys[0].size, 4096);
    assert_eq!(
        listing.common_prefixes,
        vec!["mydir1/mydir2/".to_string(), "mydir1/mydir3/".to_string()]
    );
    assert!(!listing.is_truncated);
    mock.assert();
}

#[test]
fn test_error_body_is_decoded() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/mybucket/secret")
        .with_status(403)
        .with_body(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>SignatureDoesNotMatch</Code><Message>The signature did not match</Message></Error>"#,
        )
        .create();

    let client = client_for(&server, SignatureVersion::V4);
    let err = client.get_object("mybucket", "secret", None).unwrap_err();

    match &err {
        S3Error::Status {
            status,
            code,
            message,
        } => {
            assert_eq!(*status, 403);
            assert_eq!(code, "SignatureDoesNotMatch");
            assert_eq!(message, "The signature did not match");
        }
        other => panic!("expected status error, got {}", other),
    }
    assert!(!err.is_not_found());
}

#[test]
fn test_list_scenario_against_mock() {
    let mut server = Server::new();
    let puts = server
        .mock("PUT", Matcher::Regex(r"^/mybucket/mydir1/.+".to_string()))
        .with_status(200)
        .expect(6)
        .create();
    let lists = server
        .mock("GET", "/mybucket")
        .match_query(Matcher::UrlEncoded("list-type".to_string(), "2".to_string()))
        .with_status(200)
        .with_body("<ListBucketResult><KeyCount>0</KeyCount></ListBucketResult>")
        .expect(3)
        .create();

    let client = client_for(&server, SignatureVersion::V4);
    ScenarioTest::List.run(&client, "mybucket").unwrap();

    puts.assert();
    lists.assert();
}

#[test]
fn test_get_scenario_reports_short_read() {
    let mut server = Server::new();
    let _put = server
        .mock("PUT", Matcher::Regex(r"^/mybucket/".to_string()))
        .with_status(200)
        .create();
    let _get = server
        .mock("GET", "/mybucket/mydir1/mydir2/mydir3/mykey1")
        .with_status(200)
        .with_body("0123456789")
        .create();

    let client = client_for(&server, SignatureVersion::V2);
    let err = ScenarioTest::Get.run(&client, "mybucket").unwrap_err();

    match err {
        ScenarioError::AssertionFailed(message) => {
            assert!(message.contains("expected 4096 bytes, got 10"), "{}", message);
        }
        other => panic!("expected assertion failure, got {}", other),
    }
}
