#[cfg(test)]
mod tests {
    use crate::database::{DEFAULT_LOCATIONS, seed_default_locations};
    use crate::db::{
        ProblemChanges, SessionChanges, SessionFilter, SessionOrder, UserSettings,
        authenticate_user, count_locations, create_location, create_problem, create_user,
        delete_problem, delete_session, delete_user, fetch_sessions, find_user_by_username,
        get_location_by_slug, get_locations, get_session, get_sessions, update_problem,
        update_session, update_user_settings,
    };
    use crate::error::AppError;
    use crate::models::Grade;
    use crate::test::test_db::{STANDARD_PASSWORD, TestDbBuilder, date, problem};
    use crate::test::test_utils::create_standard_test_db;
    use rocket::tokio;

    #[tokio::test]
    async fn test_create_and_find_user() {
        let test_db = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");
        let gym = test_db.location_id("test-gym").unwrap();

        let user = create_user(&test_db.pool, "new_climber", "password123", gym)
            .await
            .expect("Failed to create user");

        assert_eq!(user.username, "new_climber");
        assert_eq!(user.home_location_id, gym);
        assert_eq!(user.default_grade, None);

        let found = find_user_by_username(&test_db.pool, "new_climber")
            .await
            .unwrap()
            .expect("User should exist");
        assert_eq!(found.id, user.id);

        assert!(
            find_user_by_username(&test_db.pool, "nobody")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let test_db = TestDbBuilder::new().user("taken").build().await.unwrap();
        let gym = test_db.location_id("test-gym").unwrap();

        let result = create_user(&test_db.pool, "taken", "password123", gym).await;

        match result {
            Err(AppError::Conflict { field, .. }) => assert_eq!(field, "username"),
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_home_location_is_rejected() {
        let test_db = TestDbBuilder::new().build().await.unwrap();

        let result = create_user(&test_db.pool, "lost_climber", "password123", 9999).await;

        match result {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "home_location_id"),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticate_user() {
        let test_db = TestDbBuilder::new().user("alice").build().await.unwrap();

        let user = authenticate_user(&test_db.pool, "alice", STANDARD_PASSWORD)
            .await
            .unwrap();
        assert_eq!(user.map(|u| u.username), Some("alice".to_string()));

        assert!(
            authenticate_user(&test_db.pool, "alice", "wrong_password")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            authenticate_user(&test_db.pool, "ghost", STANDARD_PASSWORD)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_user_settings() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();
        let south = test_db.location_id("south-cave").unwrap();

        let user = update_user_settings(
            &test_db.pool,
            alice,
            &UserSettings {
                home_location_id: Some(south),
                default_grade: Some(Grade::V4V6),
            },
        )
        .await
        .unwrap();

        assert_eq!(user.home_location_id, south);
        assert_eq!(user.default_grade, Some(Grade::V4V6));

        let user = update_user_settings(&test_db.pool, alice, &UserSettings::default())
            .await
            .unwrap();
        assert_eq!(user.home_location_id, south, "Empty update keeps settings");

        let result = update_user_settings(
            &test_db.pool,
            alice,
            &UserSettings {
                home_location_id: Some(4242),
                default_grade: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();
        let alice_session = test_db.session_ids[0];

        assert_eq!(test_db.session_count().await, 3);
        assert_eq!(test_db.problem_count().await, 5);

        delete_user(&test_db.pool, alice).await.unwrap();

        assert_eq!(test_db.session_count().await, 1);
        assert_eq!(test_db.problem_count().await, 1);
        assert!(matches!(
            get_session(&test_db.pool, alice_session, alice).await,
            Err(AppError::NotFound(_))
        ));
        assert!(
            get_sessions(&test_db.pool, alice, None, None, None)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            delete_user(&test_db.pool, alice).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_session_cascades_to_problems() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();

        delete_session(&test_db.pool, test_db.session_ids[0], alice)
            .await
            .unwrap();

        assert_eq!(test_db.session_count().await, 2);
        assert_eq!(test_db.problem_count().await, 3);
    }

    #[tokio::test]
    async fn test_other_users_sessions_are_not_found() {
        let test_db = create_standard_test_db().await;
        let bob = test_db.user_id("bob").unwrap();
        let alice_session = test_db.session_ids[0];

        assert!(matches!(
            get_session(&test_db.pool, alice_session, bob).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update_session(
                &test_db.pool,
                alice_session,
                bob,
                &SessionChanges {
                    rating: Some(5),
                    ..SessionChanges::default()
                }
            )
            .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_session(&test_db.pool, alice_session, bob).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            create_problem(&test_db.pool, alice_session, bob, &problem(Grade::V0, 1, 1)).await,
            Err(AppError::NotFound(_))
        ));

        let alice_problem = get_session(
            &test_db.pool,
            alice_session,
            test_db.user_id("alice").unwrap(),
        )
        .await
        .unwrap()
        .problems[0]
            .id;

        assert!(matches!(
            update_problem(
                &test_db.pool,
                alice_problem,
                bob,
                &ProblemChanges {
                    sends: Some(0),
                    ..ProblemChanges::default()
                }
            )
            .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_problem(&test_db.pool, alice_problem, bob).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(test_db.problem_count().await, 5);
    }

    #[tokio::test]
    async fn test_get_sessions_filters_and_orders() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();
        let north = test_db.location_id("north-wall").unwrap();

        let all = get_sessions(&test_db.pool, alice, None, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, date("2024-01-05"), "Newest session first");
        assert_eq!(all[0].location_name, "South Cave");

        let at_north = get_sessions(&test_db.pool, alice, Some(north), None, None)
            .await
            .unwrap();
        assert_eq!(at_north.len(), 1);
        assert_eq!(at_north[0].problems.len(), 2);
        assert_eq!(at_north[0].problems[0].grade, Grade::V3);

        let ranged = get_sessions(
            &test_db.pool,
            alice,
            None,
            Some(date("2024-01-02")),
            Some(date("2024-01-05")),
        )
        .await
        .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].date, date("2024-01-05"));
    }

    #[tokio::test]
    async fn test_fetch_sessions_across_users() {
        let test_db = create_standard_test_db().await;
        let north = test_db.location_id("north-wall").unwrap();

        let sessions = fetch_sessions(
            &test_db.pool,
            &SessionFilter {
                location_id: Some(north),
                order: SessionOrder::Chronological,
                ..SessionFilter::default()
            },
        )
        .await
        .unwrap();

        let dates: Vec<_> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date("2024-01-01"), date("2024-01-03")]);
        assert_eq!(
            sessions.iter().map(|s| s.problems.len()).sum::<usize>(),
            3
        );
    }

    #[tokio::test]
    async fn test_update_session_replaces_problems() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();
        let session_id = test_db.session_ids[0];

        let updated = update_session(
            &test_db.pool,
            session_id,
            alice,
            &SessionChanges {
                rating: Some(8),
                problems: Some(vec![problem(Grade::V6V8, 6, 1)]),
                ..SessionChanges::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.rating, Some(8));
        assert_eq!(updated.date, date("2024-01-01"));
        assert_eq!(updated.problems.len(), 1);
        assert_eq!(updated.problems[0].grade, Grade::V6V8);
        assert_eq!(test_db.problem_count().await, 4);

        let result = update_session(
            &test_db.pool,
            session_id,
            alice,
            &SessionChanges {
                location_id: Some(31337),
                ..SessionChanges::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_problem_checks_merged_counts() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice").unwrap();

        let created = create_problem(
            &test_db.pool,
            test_db.session_ids[0],
            alice,
            &problem(Grade::V0, 3, 1),
        )
        .await
        .unwrap();
        assert_eq!(created.session_id, test_db.session_ids[0]);

        let result = update_problem(
            &test_db.pool,
            created.id,
            alice,
            &ProblemChanges {
                sends: Some(4),
                ..ProblemChanges::default()
            },
        )
        .await;
        match result {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "sends"),
            other => panic!("Expected validation error, got {:?}", other),
        }

        let updated = update_problem(
            &test_db.pool,
            created.id,
            alice,
            &ProblemChanges {
                grade: Some(Grade::V3),
                attempts: Some(5),
                sends: Some(4),
                notes: Some("crimpy".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.grade, Grade::V3);
        assert_eq!(updated.sends, 4);
        assert_eq!(updated.notes.as_deref(), Some("crimpy"));

        delete_problem(&test_db.pool, created.id, alice).await.unwrap();
        assert!(matches!(
            delete_problem(&test_db.pool, created.id, alice).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_locations_and_seed() {
        let test_db = TestDbBuilder::new()
            .location("Zed Boulders", "zed")
            .location("Alpha Gym", "alpha")
            .build()
            .await
            .unwrap();

        let names: Vec<String> = get_locations(&test_db.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Alpha Gym", "Zed Boulders"]);

        assert_eq!(
            get_location_by_slug(&test_db.pool, "zed").await.unwrap().name,
            "Zed Boulders"
        );
        assert!(matches!(
            get_location_by_slug(&test_db.pool, "missing").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            create_location(&test_db.pool, "Alpha Gym", "alpha-2").await,
            Err(AppError::Conflict { .. })
        ));

        assert_eq!(seed_default_locations(&test_db.pool).await.unwrap(), 0);
        assert_eq!(count_locations(&test_db.pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_seed_fills_empty_table_once() {
        let pool = crate::database::connect("sqlite::memory:").await.unwrap();
        crate::database::apply_schema(&pool).await.unwrap();

        let seeded = seed_default_locations(&pool).await.unwrap();
        assert_eq!(seeded, DEFAULT_LOCATIONS.len());
        assert_eq!(seed_default_locations(&pool).await.unwrap(), 0);
        assert_eq!(
            count_locations(&pool).await.unwrap(),
            DEFAULT_LOCATIONS.len() as i64
        );
    }
}
