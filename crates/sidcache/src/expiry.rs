//! When a cached record may still be served.
//!
//! Rules, first match wins:
//! 1. offline logons configured and the process is globally offline: keep
//! 2. domain unreachable and no recent connection failure recorded: keep
//! 3. domain seqnum known but the record was written unreachable: expire
//! 4. domain seqnum unreachable, or equal to the record's: keep
//! 5. otherwise: expire

use crate::domain::SeqNum;

/// Everything the decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryInput {
    pub offline_logon: bool,
    pub globally_offline: bool,
    pub domain_online: bool,
    pub recent_conn_failure: bool,
    pub domain_seqnum: SeqNum,
    pub record_seqnum: SeqNum,
}

/// The rule that decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    GloballyOffline,
    DomainOffline,
    WrittenUnreachable,
    Current,
    Changed,
}

impl Verdict {
    pub fn is_expired(self) -> bool {
        matches!(self, Verdict::WrittenUnreachable | Verdict::Changed)
    }
}

pub fn evaluate(input: &ExpiryInput) -> Verdict {
    if input.offline_logon && input.globally_offline {
        return Verdict::GloballyOffline;
    }
    if !input.domain_online && !input.recent_conn_failure {
        return Verdict::DomainOffline;
    }
    if !input.domain_seqnum.is_unreachable() && input.record_seqnum.is_unreachable() {
        return Verdict::WrittenUnreachable;
    }
    if input.domain_seqnum.is_unreachable() || input.record_seqnum == input.domain_seqnum {
        return Verdict::Current;
    }
    Verdict::Changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(domain: SeqNum, record: SeqNum) -> ExpiryInput {
        ExpiryInput {
            offline_logon: false,
            globally_offline: false,
            domain_online: true,
            recent_conn_failure: false,
            domain_seqnum: domain,
            record_seqnum: record,
        }
    }

    #[test]
    fn test_matching_seqnum_is_current() {
        assert_eq!(evaluate(&online(SeqNum(7), SeqNum(7))), Verdict::Current);
    }

    #[test]
    fn test_changed_seqnum_expires() {
        let verdict = evaluate(&online(SeqNum(8), SeqNum(7)));
        assert_eq!(verdict, Verdict::Changed);
        assert!(verdict.is_expired());
    }

    #[test]
    fn test_record_written_unreachable_expires_once_domain_answers() {
        assert_eq!(evaluate(&online(SeqNum(8), SeqNum::UNREACHABLE)), Verdict::WrittenUnreachable);
    }

    #[test]
    fn test_unreachable_domain_keeps_everything() {
        assert_eq!(evaluate(&online(SeqNum::UNREACHABLE, SeqNum(3))), Verdict::Current);
        assert_eq!(evaluate(&online(SeqNum::UNREACHABLE, SeqNum::UNREACHABLE)), Verdict::Current);
    }

    #[test]
    fn test_global_offline_needs_offline_logon() {
        let mut input = online(SeqNum(8), SeqNum(7));
        input.globally_offline = true;
        assert_eq!(evaluate(&input), Verdict::Changed);
        input.offline_logon = true;
        assert_eq!(evaluate(&input), Verdict::GloballyOffline);
    }

    #[test]
    fn test_offline_domain_grace() {
        let mut input = online(SeqNum(8), SeqNum(7));
        input.domain_online = false;
        assert_eq!(evaluate(&input), Verdict::DomainOffline);
        input.recent_conn_failure = true;
        assert_eq!(evaluate(&input), Verdict::Changed);
    }
}
