//! Business-rule checks on a parsed config that the section parsers can't
//! check locally.

use crate::config::{ChannelPruningPolicy, Config, MemberActivityPolicy};
use crate::error::{PolicyViolation, ValidationError};

use std::collections::HashSet;

/// Reject a candidate config that is well-formed but unusable.
pub fn validate_config(config: &Config) -> Result<(), ValidationError> {
    validate_channel_pruning_policies(&config.channel_pruning_policies)?;
    validate_member_activity_policy(&config.member_activity_policy)
}

fn validate_channel_pruning_policies(
    policies: &[ChannelPruningPolicy],
) -> Result<(), ValidationError> {
    for policy in policies {
        validate_channel_pruning_policy(policy).map_err(|cause| {
            ValidationError::ChannelPruningPolicy {
                channel_id: policy.channel_id,
                channel_name: policy.channel_name.clone(),
                cause,
            }
        })?;
    }

    let mut seen = HashSet::new();
    for policy in policies {
        if !seen.insert(policy.channel_id) {
            return Err(ValidationError::DuplicateChannel {
                channel_id: policy.channel_id,
                channel_name: policy.channel_name.clone(),
            });
        }
    }

    Ok(())
}

pub(crate) fn validate_channel_pruning_policy(policy: &ChannelPruningPolicy) -> Result<(), PolicyViolation> {
    if policy.channel_id == 0 {
        return Err(PolicyViolation::NonPositiveChannelId(policy.channel_id));
    }
    if policy.delete_older_than_days <= 0 {
        return Err(PolicyViolation::NonPositiveDeleteDays(
            policy.delete_older_than_days,
        ));
    }
    Ok(())
}

fn validate_member_activity_policy(policy: &MemberActivityPolicy) -> Result<(), ValidationError> {
    let violation = if policy.days_until_inactive <= 0 {
        Some(PolicyViolation::NonPositiveInactiveDays(
            policy.days_until_inactive,
        ))
    } else if policy.active_role_id == policy.inactive_role_id {
        Some(PolicyViolation::SameRole {
            role_id: policy.active_role_id,
            role_name: policy.active_role_name.clone(),
        })
    } else {
        None
    };

    match violation {
        Some(cause) => Err(ValidationError::MemberActivityPolicy { cause }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn pruning(channel_id: u64, channel_name: &str, days: i64) -> ChannelPruningPolicy {
        ChannelPruningPolicy {
            channel_id,
            channel_name: channel_name.into(),
            delete_older_than_days: days,
        }
    }

    fn config(channel_pruning_policies: Vec<ChannelPruningPolicy>) -> Config {
        Config {
            channel_pruning_policies,
            member_activity_policy: MemberActivityPolicy {
                active_role_id: 201,
                active_role_name: "Active".into(),
                inactive_role_id: 202,
                inactive_role_name: "Inactive".into(),
                days_until_inactive: 30,
            },
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(
            validate_config(&config(vec![pruning(101, "introductions", 30), pruning(102, "chat", 7)])),
            Ok(())
        );
    }

    #[test]
    fn zero_or_negative_days_name_the_channel() {
        for days in [0, -3] {
            let error = validate_config(&config(vec![pruning(101, "introductions", 30), pruning(102, "chat", days)]))
                .expect_err("non-positive days");

            assert_eq!(
                error,
                ValidationError::ChannelPruningPolicy {
                    channel_id: 102,
                    channel_name: "chat".into(),
                    cause: PolicyViolation::NonPositiveDeleteDays(days),
                }
            );
            assert!(error.to_string().contains("channel_id=102"));
            let cause = error.source().expect("chained cause");
            assert!(cause.to_string().contains(&format!("delete_older_than_days={days}")));
        }
    }

    #[test]
    fn zero_channel_id_is_rejected() {
        let error = validate_config(&config(vec![pruning(0, "ghost", 3)])).expect_err("zero id");

        assert!(matches!(
            error,
            ValidationError::ChannelPruningPolicy {
                cause: PolicyViolation::NonPositiveChannelId(0),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_channel_regardless_of_days() {
        let error = validate_config(&config(vec![
            pruning(101, "introductions", 30),
            pruning(102, "chat", 7),
            pruning(101, "introductions", 1),
        ]))
        .expect_err("duplicate");

        assert_eq!(
            error,
            ValidationError::DuplicateChannel {
                channel_id: 101,
                channel_name: "introductions".into(),
            }
        );
    }

    #[test]
    fn per_record_checks_run_before_uniqueness() {
        let error = validate_config(&config(vec![pruning(101, "a", 3), pruning(101, "a", 0)]))
            .expect_err("invalid");

        assert!(matches!(error, ValidationError::ChannelPruningPolicy { .. }));
    }

    #[test]
    fn member_activity_days_must_be_positive() {
        let mut candidate = config(Vec::new());
        candidate.member_activity_policy.days_until_inactive = 0;

        assert_eq!(
            validate_config(&candidate),
            Err(ValidationError::MemberActivityPolicy {
                cause: PolicyViolation::NonPositiveInactiveDays(0),
            })
        );
    }

    #[test]
    fn active_and_inactive_roles_must_differ() {
        let mut candidate = config(Vec::new());
        candidate.member_activity_policy.inactive_role_id = 201;

        assert!(matches!(
            validate_config(&candidate),
            Err(ValidationError::MemberActivityPolicy {
                cause: PolicyViolation::SameRole { role_id: 201, .. },
            })
        ));
    }
}
