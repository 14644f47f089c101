#[cfg(test)]
mod tests {
    use crate::schemas::ApiDoc;
    use utoipa::OpenApi;
    use utoipa::openapi::{PathItemType, RefOr, schema::Schema};

    #[test]
    fn test_openapi_schema_generation() {
        let openapi = ApiDoc::openapi();

        let components = openapi.components.as_ref().unwrap();
        for name in ["ErrorDetail", "FieldErrors", "HealthResponse", "UserDto", "TokenPair"] {
            assert!(components.schemas.contains_key(name), "missing schema {name}");
        }

        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("API TEMPLATE"));
    }

    #[test]
    fn test_error_detail_schema_structure() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.as_ref().unwrap();

        if let Some(RefOr::T(Schema::Object(obj))) = components.schemas.get("ErrorDetail") {
            assert!(obj.properties.contains_key("detail"));
            assert!(obj.properties.contains_key("code"));
        } else {
            panic!("ErrorDetail should be an object schema");
        }
    }

    #[test]
    fn test_user_schema_hides_password() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.as_ref().unwrap();

        if let Some(RefOr::T(Schema::Object(obj))) = components.schemas.get("UserDto") {
            for field in ["id", "username", "email", "name"] {
                assert!(obj.properties.contains_key(field), "missing field {field}");
            }
            assert!(!obj.properties.contains_key("password"));
        } else {
            panic!("UserDto should be an object schema");
        }
    }

    #[test]
    fn test_openapi_paths() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        let health = paths.get("/health").unwrap();
        assert!(health.operations.contains_key(&PathItemType::Get));

        let users = paths.get("/api/v1/users/").unwrap();
        assert!(users.operations.contains_key(&PathItemType::Get));
        assert!(users.operations.contains_key(&PathItemType::Post));
        assert!(!users.operations.contains_key(&PathItemType::Delete));

        let account = paths.get("/api/v1/users/{user_id}/").unwrap();
        for method in [
            PathItemType::Get,
            PathItemType::Put,
            PathItemType::Patch,
            PathItemType::Delete,
        ] {
            assert!(account.operations.contains_key(&method));
        }

        let login = paths.get("/api/v1/jwt/create/").unwrap();
        let operation = login.operations.get(&PathItemType::Post).unwrap();
        assert!(operation.responses.responses.contains_key("200"));
        assert!(operation.responses.responses.contains_key("401"));
    }

    #[test]
    fn test_jwt_security_scheme_registered() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.as_ref().unwrap();

        assert!(components.security_schemes.contains_key("jwt"));
    }
}
