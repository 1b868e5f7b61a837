use strata_core::ManagedResource;
use strata_core::hcl::{backend_config, quote};
use strata_core::resource::{BackendConfigSpec, CloudSpec, CloudWorkspaces};

fn resource() -> ManagedResource {
    let mut r = ManagedResource::default();
    r.metadata.name = "hello".into();
    r.metadata.namespace = "flux-system".into();
    r.metadata.labels.insert("team".into(), "infra".into());
    r
}

#[test]
fn default_is_cluster_backend_named_after_resource() {
    let text = backend_config(&resource(), false).unwrap().unwrap();
    assert!(text.contains("backend \"kubernetes\""));
    assert!(text.contains("secret_suffix     = \"hello\""));
    assert!(text.contains("in_cluster_config = true"));
    assert!(text.contains("namespace         = \"flux-system\""));
    assert!(text.contains("\"team\" = \"infra\""));
}

#[test]
fn outside_cluster_uses_local_backend() {
    let text = backend_config(&resource(), true).unwrap().unwrap();
    assert_eq!(text, "\nterraform {\n  backend \"local\" { }\n}");
}

#[test]
fn custom_configuration_wins() {
    let mut r = resource();
    r.spec.backend_config = Some(BackendConfigSpec {
        custom_configuration: "backend \"s3\" { bucket = \"b\" }".into(),
        secret_suffix: "ignored".into(),
        ..Default::default()
    });
    let text = backend_config(&r, true).unwrap().unwrap();
    assert_eq!(text, "\nterraform {\n  backend \"s3\" { bucket = \"b\" }\n}\n");
}

#[test]
fn explicit_backend_config_parameters() {
    let mut r = resource();
    r.spec.backend_config = Some(BackendConfigSpec {
        secret_suffix: "suffix".into(),
        in_cluster_config: false,
        config_path: "/kube/config".into(),
        ..Default::default()
    });
    let text = backend_config(&r, true).unwrap().unwrap();
    assert!(text.contains("secret_suffix     = \"suffix\""));
    assert!(text.contains("in_cluster_config = false"));
    assert!(text.contains("config_path       = \"/kube/config\""));
}

#[test]
fn disabled_backend_writes_nothing() {
    let mut r = resource();
    r.spec.backend_config = Some(BackendConfigSpec {
        disable: true,
        ..Default::default()
    });
    assert!(r.backend_completely_disabled());
    assert!(backend_config(&r, false).unwrap().is_none());
}

#[test]
fn cloud_block_replaces_backend() {
    let mut r = resource();
    r.spec.cloud = Some(CloudSpec {
        organization: "acme".into(),
        workspaces: CloudWorkspaces {
            name: String::new(),
            tags: vec!["app".into(), "prod".into()],
        },
        hostname: "app.terraform.io".into(),
        token: "t".into(),
    });
    let text = backend_config(&r, false).unwrap().unwrap();
    assert_eq!(
        text,
        "terraform {\n  cloud {\n    organization = \"acme\"\n    workspaces {\n      tags = [\"app\", \"prod\"]\n    }\n    hostname = \"app.terraform.io\"\n    token = \"t\"\n  }\n}\n"
    );
}

#[test]
fn strings_are_escaped_for_hcl() {
    assert_eq!(quote("plain").unwrap(), "\"plain\"");
    assert_eq!(quote("a\"b\\c").unwrap(), r#""a\"b\\c""#);
    assert_eq!(quote("bell\u{7}").unwrap(), r#""bell\u0007""#);
    assert_eq!(quote("a${b}").unwrap(), r#""a$${b}""#);
    assert_eq!(quote("%{ if x }").unwrap(), r#""%%{ if x }""#);
}

#[test]
fn label_values_cannot_interpolate() {
    let mut r = resource();
    r.metadata
        .labels
        .insert("owner".into(), "${file(\"/etc/passwd\")}".into());
    let text = backend_config(&r, false).unwrap().unwrap();
    assert!(text.contains(r#""owner" = "$${file(\"/etc/passwd\")}""#));
    assert!(!text.contains("= \"${"));
}
