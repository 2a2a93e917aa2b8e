//! require_mx_record: the sender domain must be able to receive mail

use mailgate_common::types::EmailAddress;
use mailgate_core::{CheckContext, CheckFunctions, Diagnostic, Verdict};

pub const NAME: &str = "require_mx_record";

pub fn functions() -> CheckFunctions {
    CheckFunctions::new().sender(check_sender)
}

async fn check_sender(ctx: CheckContext, mail_from: String) -> Verdict {
    if EmailAddress::is_null_sender(&mail_from) {
        return Verdict::neutral();
    }

    let Some(addr) = EmailAddress::parse(&mail_from) else {
        return Verdict::reject(Diagnostic::permanent(
            501,
            [5, 1, 8],
            "Malformed sender address",
        ));
    };

    // Address literals have no MX to look up.
    if addr.domain.starts_with('[') {
        return Verdict::neutral();
    }

    let Some(result) = ctx.cancellable(ctx.resolver.lookup_mx(&addr.domain)).await else {
        ctx.logger.debug(format_args!("MX lookup for {} cancelled", addr.domain));
        return Verdict::neutral();
    };

    match result {
        // RFC 7505 null MX
        Ok(records) if records.iter().all(|mx| mx.exchange.is_empty()) => {
            Verdict::reject(Diagnostic::permanent(
                550,
                [5, 7, 27],
                "Sender domain does not accept mail",
            ))
        }
        Ok(records) => {
            ctx.logger.debug(format_args!(
                "{} has {} MX record(s)",
                addr.domain,
                records.len()
            ));
            Verdict::neutral()
        }
        Err(e) if e.is_not_found() => Verdict::reject(Diagnostic::permanent(
            501,
            [5, 7, 27],
            "Sender domain has no MX record",
        )),
        Err(e) => {
            ctx.logger.warn(format_args!("MX lookup failed: {}", e));
            Verdict::reject(Diagnostic::temporary("DNS error while checking sender domain"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgate_common::MsgMetadata;
    use mailgate_core::testing::{SlowResolver, SpyResolver};
    use mailgate_core::{Check, FailAction, Resolver, StatelessCheck};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn run(resolver: impl Resolver + 'static, mail_from: &str) -> Verdict {
        let mut check = StatelessCheck::new(
            NAME,
            NAME,
            FailAction::Reject,
            functions(),
            Arc::new(resolver),
        );
        check.init(&Default::default()).unwrap();
        let mut state = check.new_message(Arc::new(MsgMetadata::new())).unwrap();
        state
            .check_sender(&CancellationToken::new(), mail_from)
            .await
    }

    fn code(v: &Verdict) -> Option<u16> {
        v.diagnostic.as_ref().map(|d| d.code)
    }

    #[tokio::test]
    async fn test_domain_with_mx_passes() {
        let resolver = SpyResolver::new().with_mx("example.com", "mx.example.com");
        assert_eq!(run(resolver, "user@Example.com").await, Verdict::neutral());
    }

    #[tokio::test]
    async fn test_null_sender_skips_lookup() {
        let resolver = SpyResolver::new();
        let calls = resolver.counter();
        assert_eq!(run(resolver, "<>").await, Verdict::neutral());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_mx_rejects() {
        let verdict = run(SpyResolver::new(), "user@nomx.example").await;
        assert_eq!(code(&verdict), Some(501));
    }

    #[tokio::test]
    async fn test_null_mx_rejects() {
        let resolver = SpyResolver::new().with_mx("nullmx.example", "");
        let verdict = run(resolver, "user@nullmx.example").await;
        assert_eq!(code(&verdict), Some(550));
    }

    #[tokio::test]
    async fn test_dns_failure_is_temporary() {
        let resolver = SpyResolver::new().with_failure("broken.example", "SERVFAIL");
        let verdict = run(resolver, "user@broken.example").await;
        assert!(verdict.diagnostic.unwrap().is_temporary());
    }

    #[tokio::test]
    async fn test_malformed_sender() {
        let verdict = run(SpyResolver::new(), "not-an-address").await;
        assert_eq!(code(&verdict), Some(501));
    }

    #[tokio::test]
    async fn test_cancelled_lookup_is_neutral() {
        let mut check = StatelessCheck::new(
            NAME,
            NAME,
            FailAction::Reject,
            functions(),
            Arc::new(SlowResolver::new(Duration::from_secs(3600))),
        );
        check.init(&Default::default()).unwrap();
        let mut state = check.new_message(Arc::new(MsgMetadata::new())).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let verdict = tokio::time::timeout(
            Duration::from_secs(1),
            state.check_sender(&cancel, "user@slow.example"),
        )
        .await
        .unwrap();
        assert_eq!(verdict, Verdict::neutral());
    }
}
