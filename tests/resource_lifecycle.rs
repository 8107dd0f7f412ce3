//! Resource lifecycle tests against a mocked Resource Manager
//!
//! Drives resources through the dispatcher the way a host would: apply a
//! configuration, refresh state, destroy.

use azrm::arm::auth::{AzureCredentials, TokenSource};
use azrm::arm::client::ArmClient;
use azrm::arm::environment::CloudEnvironment;
use azrm::plugin::resource::ImportAsExistsError;
use azrm::plugin::ResourceState;
use azrm::provider::dispatch::{self, Request, Response};
use azrm::provider::registry::{get_data_source, get_resource};
use azrm::provider::{Features, ProviderMeta};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUB: &str = "00000000-0000-0000-0000-000000000000";

fn meta_for(server: &MockServer) -> ProviderMeta {
    let env = CloudEnvironment::custom(&server.uri(), "https://login.invalid");
    let creds = AzureCredentials::new(TokenSource::Static("test-token".to_string()), env.clone())
        .expect("credentials");
    let client = ArmClient::new(creds, env, SUB, None).expect("client");
    ProviderMeta::new(client, Features::default()).with_poll_interval(Duration::from_millis(10))
}

fn rg_id(name: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}", SUB, name)
}

/// JSON bodies of the requests the server saw, in arrival order
async fn sent_bodies(server: &MockServer, verb: &str, url_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == url_path)
        .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
        .collect()
}

/// Position of the first `verb` request to `url_path`
async fn request_index(server: &MockServer, verb: &str, url_path: &str) -> Option<usize> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .position(|r| r.method.as_str() == verb && r.url.path() == url_path)
}

fn state(id: &str, attributes: Value) -> ResourceState {
    ResourceState {
        id: id.to_string(),
        schema_version: 0,
        attributes: attributes.as_object().cloned().unwrap_or_default(),
    }
}

mod resource_group {
    use super::*;

    #[tokio::test]
    async fn test_create_refuses_existing_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(rg_id("existing")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": rg_id("existing"),
                "location": "westeurope"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_resource_group").unwrap();
        let err = dispatch::apply(
            &meta,
            resource,
            Some(json!({"name": "existing", "location": "West Europe"})),
            None,
        )
        .await
        .unwrap_err();

        let exists = err.downcast_ref::<ImportAsExistsError>().expect("import-as-exists error");
        assert_eq!(exists.id, rg_id("existing"));
    }

    #[tokio::test]
    async fn test_create_then_read_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(rg_id("rg1")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(rg_id("rg1")))
            .and(body_partial_json(json!({"location": "westeurope", "tags": {"env": "test"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "properties": {"provisioningState": "Succeeded"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(rg_id("rg1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": rg_id("rg1"),
                "name": "rg1",
                "location": "westeurope",
                "tags": {"env": "test"}
            })))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_resource_group").unwrap();
        let created = dispatch::apply(
            &meta,
            resource,
            Some(json!({"name": "rg1", "location": "West Europe", "tags": {"env": "test"}})),
            None,
        )
        .await
        .unwrap()
        .expect("state");

        assert_eq!(created.id, rg_id("rg1"));
        assert_eq!(created.attributes["location"], json!("westeurope"));
        assert_eq!(created.attributes["tags"], json!({"env": "test"}));
    }

    #[tokio::test]
    async fn test_removing_tags_sends_empty_tags() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(rg_id("rg1")))
            .and(body_json(json!({"tags": {}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "rg1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(rg_id("rg1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": rg_id("rg1"),
                "name": "rg1",
                "location": "westeurope"
            })))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_resource_group").unwrap();
        let prior = state(
            &rg_id("rg1"),
            json!({"name": "rg1", "location": "westeurope", "tags": {"env": "prod"}}),
        );
        let updated = dispatch::apply(
            &meta,
            resource,
            Some(json!({"name": "rg1", "location": "westeurope"})),
            Some(prior),
        )
        .await
        .unwrap()
        .expect("state");

        assert_eq!(updated.id, rg_id("rg1"));
        assert_eq!(updated.attributes["tags"], json!({}));
    }

    #[tokio::test]
    async fn test_read_404_removes_from_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(rg_id("gone")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let response = dispatch::invoke(
            Some(&meta),
            Request::Read {
                type_name: "azurerm_resource_group".to_string(),
                state: state(&rg_id("gone"), json!({"name": "gone"})),
            },
        )
        .await;
        assert_eq!(response, Response::State { state: None });
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/resources", rg_id("gone"))))
            .and(query_param("api-version", "2021-04-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(rg_id("gone")))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let response = dispatch::invoke(
            Some(&meta),
            Request::Delete {
                type_name: "azurerm_resource_group".to_string(),
                state: state(&rg_id("gone"), json!({"name": "gone"})),
            },
        )
        .await;
        assert_eq!(response, Response::Deleted);
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_group() {
        let server = MockServer::start().await;
        let nested = format!(
            "{}/providers/Microsoft.Network/networkInterfaces/nic1",
            rg_id("busy")
        );
        Mock::given(method("GET"))
            .and(path(format!("{}/resources", rg_id("busy"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": nested}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_resource_group").unwrap();
        let err = dispatch::delete(
            &meta,
            resource,
            &state(&rg_id("busy"), json!({"name": "busy"})),
            resource.timeouts(),
        )
        .await
        .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains(&nested), "{}", message);
        assert!(message.contains("prevent_deletion_if_contains_resources"), "{}", message);
    }

    #[tokio::test]
    async fn test_data_source_missing_group_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(rg_id("nope")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let data_source = get_data_source("azurerm_resource_group").unwrap();
        let err = dispatch::read_data_source(&meta, data_source, json!({"name": "nope"}))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("was not found"));
    }
}

mod redis_cache {
    use super::*;

    fn redis_id() -> String {
        format!("{}/providers/Microsoft.Cache/redis/cache1", rg_id("rg1"))
    }

    fn redis_body(state: &str) -> Value {
        json!({
            "id": redis_id(),
            "location": "West Europe",
            "properties": {
                "provisioningState": state,
                "hostName": "cache1.redis.cache.windows.net",
                "port": 6379,
                "sslPort": 6380,
                "enableNonSslPort": false,
                "minimumTlsVersion": "1.2",
                "publicNetworkAccess": "Enabled",
                "redisVersion": "6.0.14",
                "sku": {"name": "Standard", "family": "C", "capacity": 1},
                "redisConfiguration": {"maxmemory-policy": "volatile-lru", "maxclients": "1000"}
            }
        })
    }

    #[tokio::test]
    async fn test_create_waits_for_succeeded() {
        let server = MockServer::start().await;
        let id = redis_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Creating")))
            .up_to_n_times(2)
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Succeeded")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .and(body_partial_json(json!({
                "location": "westeurope",
                "properties": {
                    "sku": {"name": "Standard", "family": "C", "capacity": 1},
                    "enableNonSslPort": false,
                    "minimumTlsVersion": "1.2",
                    "publicNetworkAccess": "Enabled"
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(redis_body("Creating")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/listKeys", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "primaryKey": "pk",
                "secondaryKey": "sk"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/patchSchedules/default", id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        let created = dispatch::apply(
            &meta,
            resource,
            Some(json!({
                "name": "cache1",
                "location": "West Europe",
                "resource_group_name": "rg1",
                "capacity": 1,
                "family": "C",
                "sku_name": "Standard"
            })),
            None,
        )
        .await
        .unwrap()
        .expect("state");

        assert_eq!(created.id, id);
        let attrs = &created.attributes;
        assert_eq!(attrs["hostname"], json!("cache1.redis.cache.windows.net"));
        assert_eq!(attrs["ssl_port"], json!(6380));
        assert_eq!(attrs["redis_version"], json!("6"));
        assert_eq!(attrs["primary_access_key"], json!("pk"));
        assert_eq!(
            attrs["primary_connection_string"],
            json!("cache1.redis.cache.windows.net:6380,password=pk,ssl=true,abortConnect=False")
        );
        assert_eq!(attrs["patch_schedule"], json!([]));
        assert_eq!(attrs["redis_configuration"][0]["maxclients"], json!(1000));
    }

    #[tokio::test]
    async fn test_create_fails_on_unexpected_state() {
        let server = MockServer::start().await;
        let id = redis_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Succeeded")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Disabled")))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        let err = dispatch::apply(
            &meta,
            resource,
            Some(json!({
                "name": "cache1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "capacity": 1,
                "family": "C",
                "sku_name": "Standard"
            })),
            None,
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Disabled"), "{:#}", err);
    }

    fn prior_cache(sku_name: &str, patch_schedule: Value) -> ResourceState {
        state(
            &redis_id(),
            json!({
                "name": "cache1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "capacity": 1,
                "family": "C",
                "sku_name": sku_name,
                "minimum_tls_version": "1.2",
                "enable_non_ssl_port": false,
                "public_network_access_enabled": true,
                "patch_schedule": patch_schedule,
                "tags": {}
            }),
        )
    }

    fn cache_config(sku_name: &str) -> Value {
        json!({
            "name": "cache1",
            "location": "westeurope",
            "resource_group_name": "rg1",
            "capacity": 1,
            "family": "C",
            "sku_name": sku_name
        })
    }

    async fn mount_keys_and_no_schedule(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{}/listKeys", redis_id())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "primaryKey": "pk",
                "secondaryKey": "sk"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/patchSchedules/default", redis_id())))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_update_removes_patch_schedule() {
        let server = MockServer::start().await;
        let id = redis_id();
        let schedule = format!("{}/patchSchedules/default", id);

        Mock::given(method("PATCH"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Succeeded")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Succeeded")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(schedule.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(schedule.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_keys_and_no_schedule(&server).await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        let prior = prior_cache(
            "Standard",
            json!([{"day_of_week": "Sunday", "maintenance_window": "PT5H", "start_hour_utc": 2}]),
        );
        let updated = dispatch::apply(&meta, resource, Some(cache_config("Standard")), Some(prior))
            .await
            .unwrap()
            .expect("state");

        assert_eq!(updated.attributes["patch_schedule"], json!([]));
        let patches = sent_bodies(&server, "PATCH", &id).await;
        assert_eq!(patches[0]["properties"]["sku"]["name"], json!("Standard"));
        assert_eq!(patches[0]["tags"], json!({}));
    }

    #[tokio::test]
    async fn test_sku_downgrade_deletes_then_creates() {
        let server = MockServer::start().await;
        let id = redis_id();
        let mut premium = redis_body("Succeeded");
        premium["properties"]["sku"]["name"] = json!("Premium");

        // the delete looks the cache up first, then create checks it is gone
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(premium))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(redis_body("Succeeded")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .and(body_partial_json(json!({"properties": {"sku": {"name": "Standard"}}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(redis_body("Succeeded")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_keys_and_no_schedule(&server).await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        let replaced = dispatch::apply(
            &meta,
            resource,
            Some(cache_config("Standard")),
            Some(prior_cache("Premium", json!([]))),
        )
        .await
        .unwrap()
        .expect("state");

        assert_eq!(replaced.id, id);
        assert_eq!(replaced.attributes["sku_name"], json!("Standard"));
        let deleted = request_index(&server, "DELETE", &id).await.expect("DELETE sent");
        let created = request_index(&server, "PUT", &id).await.expect("PUT sent");
        assert!(deleted < created);
    }

    #[tokio::test]
    async fn test_read_404_removes_from_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(redis_id()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        let refreshed = dispatch::read(&meta, resource, &state(&redis_id(), json!({})))
            .await
            .unwrap();
        assert!(refreshed.is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_cache_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(redis_id()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_redis_cache").unwrap();
        dispatch::delete(&meta, resource, &state(&redis_id(), json!({})), resource.timeouts())
            .await
            .unwrap();
    }
}

mod network_interface {
    use super::*;

    fn nic_id() -> String {
        format!("{}/providers/Microsoft.Network/networkInterfaces/nic1", rg_id("rg1"))
    }

    fn subnet_id() -> String {
        format!(
            "{}/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/internal",
            rg_id("rg1")
        )
    }

    fn nic_body(dns_servers: Value) -> Value {
        json!({
            "id": nic_id(),
            "name": "nic1",
            "location": "westeurope",
            "properties": {
                "provisioningState": "Succeeded",
                "macAddress": "00-0D-3A-2B-4C-5D",
                "enableAcceleratedNetworking": false,
                "enableIPForwarding": false,
                "dnsSettings": {"dnsServers": dns_servers, "appliedDnsServers": []},
                "networkSecurityGroup": {"id": format!("{}/providers/Microsoft.Network/networkSecurityGroups/nsg1", rg_id("rg1"))},
                "ipConfigurations": [{
                    "name": "internal",
                    "properties": {
                        "primary": true,
                        "privateIPAddress": "10.0.2.4",
                        "privateIPAllocationMethod": "Dynamic",
                        "privateIPAddressVersion": "IPv4",
                        "subnet": {"id": subnet_id()}
                    }
                }]
            }
        })
    }

    fn nic_config(dns_servers: Value) -> Value {
        json!({
            "name": "nic1",
            "location": "westeurope",
            "resource_group_name": "rg1",
            "dns_servers": dns_servers,
            "ip_configuration": [{
                "name": "internal",
                "subnet_id": subnet_id(),
                "private_ip_address_allocation": "Dynamic"
            }]
        })
    }

    #[tokio::test]
    async fn test_create_sends_primary_ip_configuration() {
        let server = MockServer::start().await;
        let id = nic_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(nic_body(json!([]))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(nic_body(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_network_interface").unwrap();
        let created = dispatch::apply(&meta, resource, Some(nic_config(json!([]))), None)
            .await
            .unwrap()
            .expect("state");

        let sent = sent_bodies(&server, "PUT", &id).await;
        let put = &sent[0];
        assert_eq!(put["location"], json!("westeurope"));
        let ip_configuration = &put["properties"]["ipConfigurations"][0];
        assert_eq!(ip_configuration["name"], json!("internal"));
        assert_eq!(ip_configuration["properties"]["primary"], json!(true));
        assert_eq!(ip_configuration["properties"]["privateIPAllocationMethod"], json!("Dynamic"));
        assert_eq!(ip_configuration["properties"]["subnet"]["id"], json!(subnet_id()));

        assert_eq!(created.id, id);
        assert_eq!(created.attributes["private_ip_address"], json!("10.0.2.4"));
        assert_eq!(created.attributes["mac_address"], json!("00-0D-3A-2B-4C-5D"));
        assert_eq!(created.attributes["ip_configuration"][0]["primary"], json!(true));
    }

    #[tokio::test]
    async fn test_update_keeps_settings_managed_elsewhere() {
        let server = MockServer::start().await;
        let id = nic_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(nic_body(json!(["10.0.0.4"]))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(nic_body(json!(["10.0.0.4"]))))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_network_interface").unwrap();
        let prior = state(
            &id,
            json!({
                "name": "nic1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "dns_servers": [],
                "ip_configuration": [{
                    "name": "internal",
                    "subnet_id": subnet_id(),
                    "private_ip_address_version": "IPv4",
                    "private_ip_address_allocation": "Dynamic",
                    "private_ip_address": "10.0.2.4",
                    "primary": true
                }],
                "tags": {}
            }),
        );
        let updated = dispatch::apply(&meta, resource, Some(nic_config(json!(["10.0.0.4"]))), Some(prior))
            .await
            .unwrap()
            .expect("state");

        let sent = sent_bodies(&server, "PUT", &id).await;
        let put = &sent[0];
        assert_eq!(put["properties"]["dnsSettings"]["dnsServers"], json!(["10.0.0.4"]));
        assert!(put["properties"]["networkSecurityGroup"]["id"]
            .as_str()
            .is_some_and(|nsg| nsg.ends_with("/nsg1")));
        assert_eq!(updated.attributes["dns_servers"], json!(["10.0.0.4"]));
    }

    #[tokio::test]
    async fn test_delete_attached_interface() {
        let server = MockServer::start().await;
        let id = nic_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(nic_body(json!([]))))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let response = dispatch::invoke(
            Some(&meta),
            Request::Delete {
                type_name: "azurerm_network_interface".to_string(),
                state: state(&id, json!({"name": "nic1"})),
            },
        )
        .await;
        assert_eq!(response, Response::Deleted);
    }
}

mod load_balancer {
    use super::*;

    fn lb_id() -> String {
        format!("{}/providers/Microsoft.Network/loadBalancers/lb1", rg_id("rg1"))
    }

    fn public_ip_id() -> String {
        format!("{}/providers/Microsoft.Network/publicIPAddresses/pip1", rg_id("rg1"))
    }

    #[tokio::test]
    async fn test_create_with_public_frontend() {
        let server = MockServer::start().await;
        let id = lb_id();
        let lb = json!({
            "id": id,
            "location": "westeurope",
            "sku": {"name": "Standard", "tier": "Regional"},
            "properties": {
                "provisioningState": "Succeeded",
                "frontendIPConfigurations": [{
                    "id": format!("{}/frontendIPConfigurations/public", id),
                    "name": "public",
                    "properties": {
                        "publicIPAddress": {"id": public_ip_id()},
                        "loadBalancingRules": [{"id": format!("{}/loadBalancingRules/http", id)}]
                    }
                }]
            }
        });

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(lb.clone()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(lb))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_lb").unwrap();
        let created = dispatch::apply(
            &meta,
            resource,
            Some(json!({
                "name": "lb1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "sku": "Standard",
                "frontend_ip_configuration": [{"name": "public", "public_ip_address_id": public_ip_id()}]
            })),
            None,
        )
        .await
        .unwrap()
        .expect("state");

        let sent = sent_bodies(&server, "PUT", &id).await;
        let put = &sent[0];
        assert_eq!(put["sku"], json!({"name": "Standard", "tier": "Regional"}));
        let frontend = &put["properties"]["frontendIPConfigurations"][0];
        assert_eq!(frontend["properties"]["publicIPAddress"]["id"], json!(public_ip_id()));
        assert!(frontend["properties"].get("subnet").is_none());

        let frontend = &created.attributes["frontend_ip_configuration"][0];
        assert_eq!(frontend["id"], json!(format!("{}/frontendIPConfigurations/public", id)));
        assert_eq!(frontend["load_balancer_rules"], json!([format!("{}/loadBalancingRules/http", id)]));
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(lb_id()))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_lb").unwrap();
        dispatch::delete(&meta, resource, &state(&lb_id(), json!({})), resource.timeouts())
            .await
            .unwrap();
    }
}

mod logic_app_workflow {
    use super::*;

    fn workflow_id() -> String {
        format!("{}/providers/Microsoft.Logic/workflows/wf1", rg_id("rg1"))
    }

    fn workflow_body(parameters: Value, definitions: Value) -> Value {
        json!({
            "id": workflow_id(),
            "name": "wf1",
            "location": "westeurope",
            "properties": {
                "state": "Enabled",
                "accessEndpoint": "https://prod-00.westeurope.logic.azure.com:443/workflows/abc",
                "definition": {
                    "$schema": "https://schema.management.azure.com/providers/Microsoft.Logic/schemas/2016-06-01/workflowdefinition.json#",
                    "contentVersion": "1.0.0.0",
                    "actions": {"notify": {"type": "Http"}},
                    "triggers": {},
                    "parameters": definitions
                },
                "parameters": parameters,
                "endpointsConfiguration": {
                    "workflow": {"outgoingIpAddresses": [{"address": "40.68.0.1"}]}
                }
            }
        })
    }

    #[tokio::test]
    async fn test_create_with_typed_parameters() {
        let server = MockServer::start().await;
        let id = workflow_id();
        let created_body = workflow_body(
            json!({"env": {"type": "String", "value": "prod"}}),
            json!({"env": {"type": "String"}}),
        );

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(created_body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(created_body))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_logic_app_workflow").unwrap();
        let created = dispatch::apply(
            &meta,
            resource,
            Some(json!({
                "name": "wf1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "workflow_parameters": {"env": r#"{"type":"String"}"#},
                "parameters": {"env": "prod"}
            })),
            None,
        )
        .await
        .unwrap()
        .expect("state");

        let sent = sent_bodies(&server, "PUT", &id).await;
        let put = &sent[0];
        assert_eq!(put["properties"]["state"], json!("Enabled"));
        assert_eq!(put["properties"]["definition"]["parameters"]["env"]["type"], json!("String"));
        assert_eq!(put["properties"]["parameters"]["env"]["value"], json!("prod"));

        assert_eq!(created.id, id);
        assert_eq!(created.attributes["parameters"], json!({"env": "prod"}));
        assert_eq!(created.attributes["workflow_outbound_ip_addresses"], json!(["40.68.0.1"]));
        assert_eq!(created.attributes["enabled"], json!(true));
    }

    #[tokio::test]
    async fn test_update_clears_removed_parameters() {
        let server = MockServer::start().await;
        let id = workflow_id();

        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow_body(
                json!({"env": {"type": "String", "value": "prod"}}),
                json!({"env": {"type": "String"}}),
            )))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow_body(json!({}), json!({}))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_logic_app_workflow").unwrap();
        let prior = state(
            &id,
            json!({
                "name": "wf1",
                "location": "westeurope",
                "resource_group_name": "rg1",
                "enabled": true,
                "workflow_schema": "https://schema.management.azure.com/providers/Microsoft.Logic/schemas/2016-06-01/workflowdefinition.json#",
                "workflow_version": "1.0.0.0",
                "workflow_parameters": {"env": r#"{"type":"String"}"#},
                "parameters": {"env": "prod"},
                "tags": {"team": "ops"}
            }),
        );
        let updated = dispatch::apply(
            &meta,
            resource,
            Some(json!({"name": "wf1", "location": "westeurope", "resource_group_name": "rg1"})),
            Some(prior),
        )
        .await
        .unwrap()
        .expect("state");

        let sent = sent_bodies(&server, "PUT", &id).await;
        let put = &sent[0];
        assert_eq!(put["properties"]["parameters"], json!({}));
        assert_eq!(put["properties"]["definition"]["parameters"], json!({}));
        assert_eq!(put["properties"]["definition"]["actions"]["notify"]["type"], json!("Http"));
        assert_eq!(put["tags"], json!({}));

        assert_eq!(updated.attributes["parameters"], json!({}));
        assert_eq!(updated.attributes["workflow_parameters"], json!({}));
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(workflow_id()))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let response = dispatch::invoke(
            Some(&meta),
            Request::Delete {
                type_name: "azurerm_logic_app_workflow".to_string(),
                state: state(&workflow_id(), json!({"name": "wf1"})),
            },
        )
        .await;
        assert_eq!(response, Response::Deleted);
    }
}

mod mssql_database {
    use super::*;

    fn server_id() -> String {
        format!("{}/providers/Microsoft.Sql/servers/srv1", rg_id("rg1"))
    }

    fn database_id() -> String {
        format!("{}/databases/db1", server_id())
    }

    fn database_body(status: &str) -> Value {
        json!({
            "id": database_id(),
            "name": "db1",
            "location": "westeurope",
            "sku": {"name": "S0", "tier": "Standard"},
            "properties": {
                "status": status,
                "collation": "SQL_Latin1_General_CP1_CI_AS",
                "maxSizeBytes": 2_147_483_648_i64,
                "currentServiceObjectiveName": "S0",
                "currentBackupStorageRedundancy": "Geo",
                "zoneRedundant": false,
                "readScale": "Disabled",
                "maintenanceConfigurationId": "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Maintenance/publicMaintenanceConfigurations/SQL_Default"
            }
        })
    }

    async fn mount_encryption(server: &MockServer) {
        let tde = format!("{}/transparentDataEncryption/current", database_id());
        Mock::given(method("PUT"))
            .and(path(tde.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(tde.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {"state": "Enabled"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_waits_for_online_twice_in_a_row() {
        let server = MockServer::start().await;
        let id = database_id();
        let operation = format!("{}/operations/sqlop", server.uri());

        Mock::given(method("GET"))
            .and(path(server_id()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": server_id(),
                "location": "westeurope"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(id.as_str()))
            .and(body_partial_json(json!({
                "location": "westeurope",
                "sku": {"name": "S0"},
                "properties": {"createMode": "Default", "maxSizeBytes": 2_147_483_648_i64}
            })))
            .respond_with(ResponseTemplate::new(202).insert_header("Azure-AsyncOperation", operation.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/sqlop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .mount(&server)
            .await;

        // existence check, then the refetch and first poll see Creating; a
        // lone Online followed by Scaling must not end the wait
        let statuses: [(Option<&str>, u64); 4] =
            [(None, 1), (Some("Creating"), 2), (Some("Online"), 1), (Some("Scaling"), 1)];
        for (priority, (status, times)) in statuses.into_iter().enumerate() {
            let response = match status {
                None => ResponseTemplate::new(404),
                Some(status) => ResponseTemplate::new(200).set_body_json(database_body(status)),
            };
            Mock::given(method("GET"))
                .and(path(id.as_str()))
                .respond_with(response)
                .up_to_n_times(times)
                .with_priority(priority as u8 + 1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(database_body("Online")))
            .expect(3)
            .mount(&server)
            .await;
        mount_encryption(&server).await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_mssql_database").unwrap();
        let created = dispatch::apply(
            &meta,
            resource,
            Some(json!({
                "name": "db1",
                "server_id": server_id(),
                "sku_name": "S0",
                "max_size_gb": 2
            })),
            None,
        )
        .await
        .unwrap()
        .expect("state");

        assert_eq!(created.id, id);
        assert_eq!(created.attributes["max_size_gb"], json!(2));
        assert_eq!(created.attributes["maintenance_configuration_name"], json!("SQL_Default"));
        assert_eq!(created.attributes["transparent_data_encryption_enabled"], json!(true));
        let tde = format!("{}/transparentDataEncryption/current", id);
        assert_eq!(
            sent_bodies(&server, "PUT", &tde).await,
            vec![json!({"properties": {"state": "Enabled"}})]
        );
    }

    #[tokio::test]
    async fn test_update_leaves_elastic_pool() {
        let server = MockServer::start().await;
        let id = database_id();

        Mock::given(method("PATCH"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(database_body("Online")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(database_body("Online")))
            .mount(&server)
            .await;
        mount_encryption(&server).await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_mssql_database").unwrap();
        let prior = state(
            &id,
            json!({
                "name": "db1",
                "server_id": server_id(),
                "sku_name": "S0",
                "create_mode": "Default",
                "elastic_pool_id": format!("{}/elasticPools/pool1", server_id()),
                "storage_account_type": "Geo",
                "geo_backup_enabled": true,
                "transparent_data_encryption_enabled": true,
                "tags": {}
            }),
        );
        let updated = dispatch::apply(
            &meta,
            resource,
            Some(json!({"name": "db1", "server_id": server_id(), "sku_name": "S0"})),
            Some(prior),
        )
        .await
        .unwrap()
        .expect("state");

        let sent = sent_bodies(&server, "PATCH", &id).await;
        let patch = &sent[0];
        let properties = patch["properties"].as_object().expect("properties");
        assert_eq!(properties.get("elasticPoolId"), Some(&Value::Null));
        assert!(properties["maintenanceConfigurationId"]
            .as_str()
            .is_some_and(|m| m.ends_with("/SQL_Default")));
        assert!(patch.get("sku").is_none());
        assert_eq!(updated.attributes["elastic_pool_id"], Value::Null);
    }
}

mod import {
    use super::*;

    #[tokio::test]
    async fn test_import_rejects_malformed_id() {
        let server = MockServer::start().await;
        let meta = meta_for(&server);
        let response = dispatch::invoke(
            Some(&meta),
            Request::Import {
                type_name: "azurerm_redis_cache".to_string(),
                id: rg_id("rg1"),
            },
        )
        .await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_import_of_missing_object_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(rg_id("ghost")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let meta = meta_for(&server);
        let resource = get_resource("azurerm_resource_group").unwrap();
        let err = dispatch::import(&meta, resource, &rg_id("ghost")).await.unwrap_err();
        assert!(err.to_string().contains("non-existent"));
    }
}
