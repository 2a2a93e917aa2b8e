//! require_matching_rdns: the client's reverse DNS must name its EHLO host

use mailgate_core::{CheckContext, CheckFunctions, Diagnostic, Verdict};

pub const NAME: &str = "require_matching_rdns";

pub fn functions() -> CheckFunctions {
    CheckFunctions::new().connection(check_connection)
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

async fn check_connection(ctx: CheckContext) -> Verdict {
    let Some(conn) = ctx.msg_meta.conn.clone() else {
        // Locally generated message
        return Verdict::neutral();
    };
    let Some(client_ip) = conn.client_ip else {
        return Verdict::neutral();
    };

    let Some(helo) = conn.helo.as_deref().map(normalize).filter(|h| !h.is_empty()) else {
        return Verdict::reject(Diagnostic::permanent(
            550,
            [5, 7, 25],
            "No EHLO hostname given",
        ));
    };

    let Some(result) = ctx.cancellable(ctx.resolver.lookup_ptr(client_ip)).await else {
        ctx.logger.debug(format_args!("PTR lookup for {} cancelled", client_ip));
        return Verdict::neutral();
    };

    match result {
        Ok(names) => {
            if names.iter().any(|name| normalize(name) == helo) {
                Verdict::neutral()
            } else {
                ctx.logger.debug(format_args!(
                    "EHLO {} not among PTR names {:?} of {}",
                    helo, names, client_ip
                ));
                Verdict::reject(Diagnostic::permanent(
                    550,
                    [5, 7, 25],
                    "rDNS name does not match source hostname",
                ))
            }
        }
        Err(e) if e.is_not_found() => Verdict::reject(Diagnostic::permanent(
            550,
            [5, 7, 25],
            "No PTR record for client IP",
        )),
        Err(e) => {
            ctx.logger.warn(format_args!("PTR lookup failed: {}", e));
            Verdict::reject(Diagnostic::temporary("DNS error during rDNS check"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgate_common::{ConnInfo, MsgMetadata};
    use mailgate_core::testing::SpyResolver;
    use mailgate_core::{Check, FailAction, StatelessCheck};
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const CLIENT: &str = "192.0.2.25";

    fn conn(helo: Option<&str>) -> ConnInfo {
        ConnInfo {
            client_ip: Some(CLIENT.parse().unwrap()),
            helo: helo.map(str::to_string),
            ..Default::default()
        }
    }

    async fn run(resolver: SpyResolver, meta: MsgMetadata, fail_action: &str) -> Verdict {
        let mut check = StatelessCheck::new(
            NAME,
            NAME,
            FailAction::Reject,
            functions(),
            Arc::new(resolver),
        );
        let block = format!("fail_action = \"{}\"", fail_action).parse().unwrap();
        check.init(&block).unwrap();
        let mut state = check.new_message(Arc::new(meta)).unwrap();
        state.check_connection(&CancellationToken::new()).await
    }

    fn resolver() -> SpyResolver {
        let ip: IpAddr = CLIENT.parse().unwrap();
        SpyResolver::new().with_ptr(ip, "mail.example.org.")
    }

    #[tokio::test]
    async fn test_matching_rdns_passes() {
        let meta = MsgMetadata::new().with_conn(conn(Some("Mail.Example.org")));
        assert_eq!(run(resolver(), meta, "reject").await, Verdict::neutral());
    }

    #[tokio::test]
    async fn test_mismatch_rejects() {
        let meta = MsgMetadata::new().with_conn(conn(Some("spoofed.example.net")));
        let verdict = run(resolver(), meta, "reject").await;
        assert_eq!(verdict.diagnostic.unwrap().enhanced_code, [5, 7, 25]);
    }

    #[tokio::test]
    async fn test_mismatch_scored_in_monitor_mode() {
        let meta = MsgMetadata::new().with_conn(conn(Some("spoofed.example.net")));
        assert_eq!(run(resolver(), meta, "score 3").await, Verdict::score(3));
    }

    #[tokio::test]
    async fn test_local_message_skips_lookup() {
        let spy = resolver();
        let calls = spy.counter();
        assert_eq!(
            run(spy, MsgMetadata::new(), "reject").await,
            Verdict::neutral()
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_ptr_rejects() {
        let meta = MsgMetadata::new().with_conn(conn(Some("mail.example.org")));
        let verdict = run(SpyResolver::new(), meta, "reject").await;
        assert_eq!(verdict.diagnostic.unwrap().message, "No PTR record for client IP");
    }

    #[tokio::test]
    async fn test_missing_helo_rejects() {
        let meta = MsgMetadata::new().with_conn(conn(None));
        assert!(run(resolver(), meta, "reject").await.is_reject());
    }
}
