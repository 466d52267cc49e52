#[cfg(test)]
pub mod test_db {
    use crate::database::{apply_schema, connect};
    use crate::db::{NewProblem, NewSession, create_location, create_session, create_user};
    use crate::error::AppError;
    use crate::models::Grade;
    use chrono::NaiveDate;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        locations: Vec<TestLocation>,
        users: Vec<TestUser>,
        sessions: Vec<TestSession>,
    }

    pub struct TestLocation {
        pub name: String,
        pub slug: String,
    }

    pub struct TestUser {
        pub username: String,
        pub password: String,
        pub home_location_slug: Option<String>,
    }

    pub struct TestSession {
        pub username: String,
        pub location_slug: String,
        pub date: NaiveDate,
        pub rating: Option<i64>,
        pub problems: Vec<NewProblem>,
    }

    pub fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("Test date should be YYYY-MM-DD")
    }

    pub fn problem(grade: Grade, attempts: i64, sends: i64) -> NewProblem {
        NewProblem {
            grade,
            attempts,
            sends,
            notes: None,
        }
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn location(mut self, name: &str, slug: &str) -> Self {
            self.locations.push(TestLocation {
                name: name.to_string(),
                slug: slug.to_string(),
            });
            self
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                password: STANDARD_PASSWORD.to_string(),
                home_location_slug: None,
            });
            self
        }

        pub fn user_with_password(
            mut self,
            username: &str,
            password: &str,
            home_location_slug: Option<&str>,
        ) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                password: password.to_string(),
                home_location_slug: home_location_slug.map(String::from),
            });
            self
        }

        pub fn session(
            mut self,
            username: &str,
            location_slug: &str,
            on: &str,
            problems: Vec<NewProblem>,
        ) -> Self {
            self.sessions.push(TestSession {
                username: username.to_string(),
                location_slug: location_slug.to_string(),
                date: date(on),
                rating: None,
                problems,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = connect("sqlite::memory:").await?;
            apply_schema(&pool).await?;

            let mut location_id_map: HashMap<String, i64> = HashMap::new();
            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut session_ids: Vec<i64> = Vec::new();

            let mut locations = self.locations;
            if locations.is_empty() {
                locations.push(TestLocation {
                    name: "Test Gym".to_string(),
                    slug: "test-gym".to_string(),
                });
            }

            for location in &locations {
                let created = create_location(&pool, &location.name, &location.slug).await?;
                location_id_map.insert(location.slug.clone(), created.id);
            }

            let first_location_id = location_id_map[&locations[0].slug];

            for user in &self.users {
                let home_location_id = user
                    .home_location_slug
                    .as_ref()
                    .and_then(|slug| location_id_map.get(slug).copied())
                    .unwrap_or(first_location_id);

                let created =
                    create_user(&pool, &user.username, &user.password, home_location_id).await?;
                user_id_map.insert(user.username.clone(), created.id);
            }

            for session in self.sessions {
                let user_id = user_id_map[&session.username];
                let location_id = location_id_map[&session.location_slug];

                let created = create_session(
                    &pool,
                    user_id,
                    &NewSession {
                        location_id,
                        date: session.date,
                        rating: session.rating,
                        problems: session.problems,
                    },
                )
                .await?;
                session_ids.push(created.id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                location_id_map,
                session_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub location_id_map: HashMap<String, i64>,
        pub session_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn location_id(&self, slug: &str) -> Option<i64> {
            self.location_id_map.get(slug).copied()
        }

        pub async fn problem_count(&self) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM problems")
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count problems")
        }

        pub async fn session_count(&self) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count sessions")
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder, date, problem};

    use crate::auth::TokenResponse;
    use crate::config::Config;
    use crate::init_rocket;
    use crate::models::Grade;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;

    /// Two gyms, two climbers. alice climbs at both, bob only at North Wall.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .location("North Wall", "north-wall")
            .location("South Cave", "south-cave")
            .user("alice")
            .user("bob")
            .session(
                "alice",
                "north-wall",
                "2024-01-01",
                vec![problem(Grade::V3, 3, 2), problem(Grade::V0, 2, 2)],
            )
            .session(
                "alice",
                "south-cave",
                "2024-01-05",
                vec![problem(Grade::V4V6, 5, 1), problem(Grade::VB, 1, 0)],
            )
            .session(
                "bob",
                "north-wall",
                "2024-01-03",
                vec![problem(Grade::V3, 4, 4)],
            )
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), Config::for_tests())
            .expect("Failed to build rocket instance");

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, username: &str, password: &str) -> String {
        let response = client
            .post("/auth/login")
            .header(ContentType::Form)
            .body(format!("username={}&password={}", username, password))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "Login failed for {}", username);

        let token: TokenResponse = response
            .into_json()
            .await
            .expect("Login response should be a token");
        token.access_token
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }
}
