use testfachdienst_api::HelloZetaResource;

/// Greeting served on `/hellozeta`
pub const HELLO_ZETA_MESSAGE: &str = "Hello ZETA!";

#[derive(Clone, Debug, Default)]
pub struct HelloZetaService;

impl HelloZetaService {
    pub fn hello_zeta_resource(&self) -> HelloZetaResource {
        HelloZetaResource::new(HELLO_ZETA_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_zeta_resource() {
        let resource = HelloZetaService.hello_zeta_resource();
        assert_eq!(resource.message, "Hello ZETA!");
    }
}
