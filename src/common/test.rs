use serde::Deserialize;

use super::ApiSnapshot;

/// Loads a multi document yaml of gateways, virtual services and route tables into a snapshot.
pub fn load_snapshot(yaml: &str) -> ApiSnapshot {
    let mut snapshot = ApiSnapshot::default();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document).unwrap();
        match value["kind"].as_str().unwrap() {
            "Gateway" => snapshot.gateways.push(serde_yaml::from_value(value).unwrap()),
            "VirtualService" => snapshot.virtual_services.push(serde_yaml::from_value(value).unwrap()),
            "RouteTable" => snapshot.route_tables.push(serde_yaml::from_value(value).unwrap()),
            kind => panic!("unexpected kind {kind}"),
        }
    }
    snapshot.sorted()
}

#[test]
pub fn test_load_snapshot() {
    let snapshot = load_snapshot(
        r"
apiVersion: gateway.solo.io/v1
kind: RouteTable
metadata:
  name: rt
  namespace: ns
  generation: 3
spec:
  weight: 20
  routes:
  - matchers:
    - prefix: /a/b
    routeAction:
      single:
        upstream:
          name: upstream
---
apiVersion: gateway.solo.io/v1
kind: VirtualService
metadata:
  name: vs
  namespace: ns
spec:
  virtualHost:
    domains: ['*']
    routes:
    - matchers:
      - prefix: /a
      delegateAction:
        ref:
          name: rt
---
apiVersion: gateway.solo.io/v1
kind: Gateway
metadata:
  name: gw
  namespace: ns
spec:
  bindAddress: '::'
  bindPort: 8080
",
    );
    assert_eq!(snapshot.gateways.len(), 1);
    assert_eq!(snapshot.gateways[0].spec.kind(), crate::apis::GatewayKind::Http);
    let route_table = snapshot.route_table("rt", "ns").unwrap();
    assert_eq!(route_table.spec.weight, Some(20));
    assert_eq!(route_table.metadata.generation, Some(3));
    let virtual_service = snapshot.virtual_service("vs", "ns").unwrap();
    let routes = &virtual_service.spec.virtual_host.as_ref().unwrap().routes;
    assert!(matches!(routes[0].action, Some(crate::apis::routes::Action::DelegateAction(_))));
}
