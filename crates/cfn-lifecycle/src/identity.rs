// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Physical resource id derivation.

use md5::{Digest, Md5};

/// Derive the physical resource id for a logical resource.
///
/// MD5 over `stack_id ++ logical_resource_id`, rendered as 32 lowercase hex
/// characters. The digest is an identity, not a security boundary; MD5 keeps
/// ids stable with those already issued to existing stacks.
pub fn physical_resource_id(stack_id: &str, logical_resource_id: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(stack_id.as_bytes());
    hasher.update(logical_resource_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // md5("abc")
        assert_eq!(
            physical_resource_id("a", "bc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_deterministic_and_fixed_length() {
        let stack = "arn:aws:cloudformation:eu-west-1:123456789012:stack/app/1234";
        let first = physical_resource_id(stack, "Bucket");
        let second = physical_resource_id(stack, "Bucket");

        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_distinct_inputs_differ() {
        let stack = "arn:aws:cloudformation:eu-west-1:123456789012:stack/app/1234";
        assert_ne!(
            physical_resource_id(stack, "Bucket"),
            physical_resource_id(stack, "Queue")
        );
        assert_ne!(
            physical_resource_id("stack-a", "Bucket"),
            physical_resource_id("stack-b", "Bucket")
        );
    }
}
