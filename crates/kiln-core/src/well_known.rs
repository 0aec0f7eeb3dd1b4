//! Well-known identifiers created by the bootstrap engine.

use uuid::Uuid;

pub const GLOBAL_TENANT_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000001);
pub const GLOBAL_TENANT_NAME: &str = "Global";
pub const GLOBAL_TENANT_SLUG: &str = "global";
pub const GLOBAL_TENANT_DOMAIN: &str = "kiln.local";

pub const GLOBAL_ROOT_CERTIFICATE_ID: Uuid =
    Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000100);
pub const GLOBAL_ROOT_CERTIFICATE_SLUG: &str = "global-root-ca";

pub const DEFAULT_SUPERUSER_USER_ID: Uuid =
    Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000200);

pub const SUPERUSER_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000300);
pub const ADMIN_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000301);
pub const MANAGER_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000302);
pub const USER_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000303);
pub const AUDITOR_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000304);
pub const GUEST_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000305);
pub const NONE_ROLE_ID: Uuid = Uuid::from_u128(0x6b696c6e_0000_4000_8000_000000000306);

/// Principal id used for writes performed by the system itself.
pub const SYSTEM_PRINCIPAL_ID: Uuid = Uuid::nil();
