use rustle_connect::host::MAX_GATEWAY_DEPTH;
use rustle_connect::inventory::InventoryError;
use rustle_connect::{ConnectSettings, Connection, Inventory};
use tempfile::TempDir;

#[tokio::test]
async fn test_load_inventory_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inventory.yml");
    std::fs::write(
        &path,
        r#"
hosts:
  bastion:
    address: bastion.example.com
    user: jump
  app:
    address: 10.0.0.20
    user: deploy
    gateway: bastion
  controller:
    local: true
    sudo: true
groups:
  apps: [app]
"#,
    )
    .unwrap();

    let inventory = Inventory::load(&path).await.unwrap();
    assert_eq!(inventory.len(), 3);

    let app = inventory.single("apps").unwrap();
    let ssh = app.as_ssh().unwrap();
    assert_eq!(ssh.endpoint(), "deploy@10.0.0.20:22");
    assert_eq!(ssh.gateway().unwrap().endpoint(), "jump@bastion.example.com:22");

    let controller = inventory.host("controller").unwrap();
    assert!(controller.is_local());
    assert!(controller.use_sudo());

    // Connections can be built without touching the network
    let conn = app.connect(&ConnectSettings::without_ssh_config()).unwrap();
    assert_eq!(conn.host().addr(), "10.0.0.20");
}

#[tokio::test]
async fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Inventory::load(&dir.path().join("nope.yml")).await,
        Err(InventoryError::FileNotFound { .. })
    ));
}

#[test]
fn test_gateway_chain_depth_is_bounded() {
    let mut yaml = String::from("hosts:\n  hop0: {}\n");
    for i in 1..=MAX_GATEWAY_DEPTH + 1 {
        yaml.push_str(&format!("  hop{i}: {{ gateway: hop{} }}\n", i - 1));
    }

    assert!(matches!(
        Inventory::from_yaml(&yaml),
        Err(InventoryError::Host(_))
    ));
}

#[test]
fn test_invalid_yaml() {
    assert!(matches!(
        Inventory::from_yaml("hosts: [not, a, map]"),
        Err(InventoryError::InvalidYaml { .. })
    ));
}

#[test]
fn test_local_host_with_ssh_parameters() {
    assert!(matches!(
        Inventory::from_yaml("hosts:\n  me: { local: true, port: 22 }\n"),
        Err(InventoryError::InvalidLocalHost { .. })
    ));
}
