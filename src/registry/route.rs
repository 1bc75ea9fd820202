//! Route to service mapping.

use super::RegistryError;
use std::collections::HashMap;

/// Maps public routes to the ID of the service that owns them.
///
/// Routes are matched by exact string equality and are not normalized.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<String, String>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a route to a service.
    ///
    /// Fails with `RouteAlreadyRegistered` if the route exists and `force` is
    /// not set. A forced registration overwrites the existing mapping.
    pub fn register(
        &mut self,
        route: &str,
        service_id: &str,
        force: bool,
    ) -> Result<(), RegistryError> {
        if !force && self.routes.contains_key(route) {
            return Err(RegistryError::RouteAlreadyRegistered(route.to_string()));
        }
        self.routes.insert(route.to_string(), service_id.to_string());
        Ok(())
    }

    /// Remove a route, returning the service ID it pointed to.
    pub fn unregister(&mut self, route: &str) -> Result<String, RegistryError> {
        self.routes
            .remove(route)
            .ok_or_else(|| RegistryError::UnregisteredRoute(route.to_string()))
    }

    /// Resolve a route to its service ID.
    pub fn lookup_service_id(&self, route: &str) -> Option<&str> {
        self.routes.get(route).map(String::as_str)
    }

    pub fn is_registered(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    /// Routes currently mapped to the given service.
    pub fn routes_of(&self, service_id: &str) -> Vec<String> {
        self.routes
            .iter()
            .filter(|(_, id)| id.as_str() == service_id)
            .map(|(route, _)| route.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut routes = RouteRegistry::new();
        routes.register("api.example.com", "svc-1", false).unwrap();

        assert!(routes.is_registered("api.example.com"));
        assert_eq!(routes.lookup_service_id("api.example.com"), Some("svc-1"));
        assert_eq!(routes.lookup_service_id("web.example.com"), None);
    }

    #[test]
    fn test_register_duplicate_fails_and_keeps_mapping() {
        let mut routes = RouteRegistry::new();
        routes.register("api.example.com", "svc-1", false).unwrap();

        let err = routes.register("api.example.com", "svc-2", false).unwrap_err();
        assert!(matches!(err, RegistryError::RouteAlreadyRegistered(ref r) if r == "api.example.com"));
        assert_eq!(routes.lookup_service_id("api.example.com"), Some("svc-1"));
    }

    #[test]
    fn test_forced_register_overwrites() {
        let mut routes = RouteRegistry::new();
        routes.register("api.example.com", "svc-1", false).unwrap();
        routes.register("api.example.com", "svc-2", true).unwrap();
        assert_eq!(routes.lookup_service_id("api.example.com"), Some("svc-2"));
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn test_trailing_slash_is_distinct() {
        let mut routes = RouteRegistry::new();
        routes.register("example.com", "svc-1", false).unwrap();
        routes.register("example.com/", "svc-2", false).unwrap();
        assert_eq!(routes.lookup_service_id("example.com"), Some("svc-1"));
        assert_eq!(routes.lookup_service_id("example.com/"), Some("svc-2"));
    }

    #[test]
    fn test_unregister() {
        let mut routes = RouteRegistry::new();
        routes.register("api.example.com", "svc-1", false).unwrap();

        assert_eq!(routes.unregister("api.example.com").unwrap(), "svc-1");
        assert!(!routes.is_registered("api.example.com"));
        assert!(routes.is_empty());

        let err = routes.unregister("api.example.com").unwrap_err();
        assert!(matches!(err, RegistryError::UnregisteredRoute(_)));
    }

    #[test]
    fn test_routes_of() {
        let mut routes = RouteRegistry::new();
        routes.register("a.example.com", "svc-1", false).unwrap();
        routes.register("b.example.com", "svc-1", false).unwrap();
        routes.register("c.example.com", "svc-2", false).unwrap();

        let mut owned = routes.routes_of("svc-1");
        owned.sort();
        assert_eq!(owned, vec!["a.example.com", "b.example.com"]);
    }
}
