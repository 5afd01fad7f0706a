use indoc::indoc;
use tether::{Driver, Result, RowLabeled, Scope, SqlTemplate, Statement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_id: String,
    pub money: i64,
}

impl Member {
    pub fn new(member_id: impl Into<String>, money: i64) -> Self {
        Self {
            member_id: member_id.into(),
            money,
        }
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        Ok(Self {
            member_id: row.get("member_id")?,
            money: row.get("money")?,
        })
    }
}

/// Member table access. Methods taking a scope run on the scope's transaction
/// when there is one, the `_on` variants on a connection the caller manages.
pub struct MemberRepository<D: Driver> {
    template: SqlTemplate<D>,
}

impl<D: Driver> Clone for MemberRepository<D> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
        }
    }
}

impl<D: Driver> MemberRepository<D> {
    pub fn new(template: SqlTemplate<D>) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &SqlTemplate<D> {
        &self.template
    }

    pub async fn create_table(&self, scope: &mut Scope<D>) -> Result<()> {
        self.template
            .execute(
                scope,
                "create_table",
                &Statement::new(indoc! {"
                    CREATE TABLE IF NOT EXISTS member (
                        member_id VARCHAR(64) PRIMARY KEY,
                        money INTEGER NOT NULL DEFAULT 0
                    )
                "}),
            )
            .await?;
        Ok(())
    }

    pub async fn drop_table(&self, scope: &mut Scope<D>) -> Result<()> {
        self.template
            .execute(
                scope,
                "drop_table",
                &Statement::new("DROP TABLE IF EXISTS member"),
            )
            .await?;
        Ok(())
    }

    pub async fn save(&self, scope: &mut Scope<D>, member: &Member) -> Result<()> {
        self.template
            .execute(scope, "save", &insert(member))
            .await?;
        Ok(())
    }

    /// [`tether::Error::EmptyResult`] when the member does not exist.
    pub async fn find_by_id(&self, scope: &mut Scope<D>, member_id: &str) -> Result<Member> {
        let row = self
            .template
            .fetch_one(scope, "find_by_id", &select(member_id))
            .await?;
        Member::from_row(&row)
    }

    pub async fn update(&self, scope: &mut Scope<D>, member_id: &str, money: i64) -> Result<()> {
        self.template
            .execute(scope, "update", &update(member_id, money))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, scope: &mut Scope<D>, member_id: &str) -> Result<()> {
        self.template
            .execute(
                scope,
                "delete",
                &Statement::new("DELETE FROM member WHERE member_id = ?").bind(member_id),
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_id_on(
        &self,
        connection: &mut D::Connection,
        member_id: &str,
    ) -> Result<Member> {
        let rows = self
            .template
            .fetch_on(connection, "find_by_id", &select(member_id))
            .await?;
        let row = rows.first().ok_or_else(|| tether::Error::EmptyResult {
            operation: "find_by_id".into(),
        })?;
        Member::from_row(row)
    }

    pub async fn update_on(
        &self,
        connection: &mut D::Connection,
        member_id: &str,
        money: i64,
    ) -> Result<()> {
        self.template
            .execute_on(connection, "update", &update(member_id, money))
            .await?;
        Ok(())
    }
}

fn insert(member: &Member) -> Statement {
    Statement::new("INSERT INTO member (member_id, money) VALUES (?, ?)")
        .bind(member.member_id.as_str())
        .bind(member.money)
}

fn select(member_id: &str) -> Statement {
    Statement::new("SELECT member_id, money FROM member WHERE member_id = ?").bind(member_id)
}

fn update(member_id: &str, money: i64) -> Statement {
    Statement::new("UPDATE member SET money = ? WHERE member_id = ?")
        .bind(money)
        .bind(member_id)
}
