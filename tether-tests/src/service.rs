use crate::{Member, MemberRepository};
use tether::{
    Connection, Driver, ErrorKind, Scope, TransactionalService, UnitOfWork, transactional,
};
use uuid::Uuid;

/// Member id the transfer rejects after debiting the sender.
pub const MEMBER_EX: &str = "ex";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Storage(#[from] tether::Error),
    #[error("Transfers to `{member_id}` are rejected")]
    Rejected { member_id: String },
}

fn validate(member: &Member) -> Result<(), TransferError> {
    if member.member_id == MEMBER_EX {
        return Err(TransferError::Rejected {
            member_id: member.member_id.clone(),
        });
    }
    Ok(())
}

/// Account transfer, written once per demarcation style.
pub struct TransferService<D: Driver> {
    unit_of_work: UnitOfWork<D>,
    members: MemberRepository<D>,
}

impl<D: Driver> TransactionalService for TransferService<D> {
    type Driver = D;

    fn unit_of_work(&self) -> &UnitOfWork<D> {
        &self.unit_of_work
    }
}

impl<D: Driver> TransferService<D> {
    pub fn new(unit_of_work: UnitOfWork<D>) -> Self {
        let members = MemberRepository::new(unit_of_work.template());
        Self {
            unit_of_work,
            members,
        }
    }

    pub fn members(&self) -> &MemberRepository<D> {
        &self.members
    }

    /// The connection is acquired and handed to every repository call by hand.
    pub async fn transfer_manual(&self, from: &str, to: &str, amount: i64) -> Result<(), TransferError> {
        let pool = self.unit_of_work.pool();
        let mut connection = pool.acquire().await?;
        log::debug!("Transferring {} on {}", amount, connection.id());
        let mut result = self.transfer_on(&mut connection, from, to, amount).await;
        if result.is_ok() {
            if let Err(e) = connection.commit().await {
                let error = pool.translator().translate("commit", "COMMIT", e);
                result = Err(tether::Error::Storage(error).into());
            }
        }
        let mut ended = true;
        if result.is_err() {
            if let Err(e) = connection.rollback().await {
                log::error!("{:#}", pool.translator().translate("rollback", "ROLLBACK", e));
                ended = false;
            }
        }
        // Still inside the transaction: the pool resets or discards the session.
        if ended {
            if let Err(e) = connection.set_auto_commit(true).await {
                log::error!(
                    "{:#}",
                    pool.translator().translate("set_auto_commit", "", e)
                );
            }
        }
        pool.release(connection).await;
        result
    }

    async fn transfer_on(
        &self,
        connection: &mut D::Connection,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        if let Err(e) = connection.set_auto_commit(false).await {
            let error = self
                .unit_of_work
                .pool()
                .translator()
                .translate("begin", "BEGIN", e);
            return Err(tether::Error::Storage(error).into());
        }
        let from_member = self.members.find_by_id_on(connection, from).await?;
        let to_member = self.members.find_by_id_on(connection, to).await?;
        self.members
            .update_on(connection, from, from_member.money - amount)
            .await?;
        validate(&to_member)?;
        self.members
            .update_on(connection, to, to_member.money + amount)
            .await?;
        Ok(())
    }

    /// Begin, commit and rollback through the coordinator by hand.
    pub async fn transfer_coordinated(
        &self,
        scope: &mut Scope<D>,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        let coordinator = self.unit_of_work.coordinator();
        let status = coordinator.begin(scope).await?;
        match self.transfer_logic(scope, from, to, amount).await {
            Ok(()) => Ok(coordinator.commit(scope, status).await?),
            Err(e) => {
                coordinator.rollback(scope, status).await?;
                Err(e)
            }
        }
    }

    /// Explicit unit of work.
    pub async fn transfer(
        &self,
        scope: &mut Scope<D>,
        from: &str,
        to: &str,
        amount: i64,
    ) -> tether::Result<()> {
        self.unit_of_work
            .run(scope, async |scope| {
                self.transfer_logic(scope, from, to, amount).await
            })
            .await
    }

    /// Declarative unit of work.
    #[transactional]
    pub async fn transfer_declarative(
        &self,
        scope: &mut Scope<D>,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        let from_member = self.members.find_by_id(scope, from).await?;
        let to_member = self.members.find_by_id(scope, to).await?;
        self.members
            .update(scope, from, from_member.money - amount)
            .await?;
        validate(&to_member)?;
        self.members
            .update(scope, to, to_member.money + amount)
            .await?;
        Ok(())
    }

    async fn transfer_logic(
        &self,
        scope: &mut Scope<D>,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        let from_member = self.members.find_by_id(scope, from).await?;
        let to_member = self.members.find_by_id(scope, to).await?;
        self.members
            .update(scope, from, from_member.money - amount)
            .await?;
        validate(&to_member)?;
        self.members
            .update(scope, to, to_member.money + amount)
            .await?;
        Ok(())
    }
}

/// Member sign up that recovers from a taken id.
pub struct RegistrationService<D: Driver> {
    members: MemberRepository<D>,
}

impl<D: Driver> RegistrationService<D> {
    pub fn new(members: MemberRepository<D>) -> Self {
        Self { members }
    }

    /// Save a member with `member_id`, or with a generated id derived from it
    /// when `member_id` is taken. Other storage errors are returned as they
    /// are.
    pub async fn join(&self, scope: &mut Scope<D>, member_id: &str) -> tether::Result<Member> {
        let member = Member::new(member_id, 0);
        match self.members.save(scope, &member).await {
            Ok(()) => Ok(member),
            Err(e) if e.kind() == Some(ErrorKind::DuplicateKey) => {
                let retry = Member::new(generate_new_id(member_id), 0);
                log::warn!(
                    "Member id `{}` is taken, retrying as `{}`",
                    member_id,
                    retry.member_id
                );
                self.members.save(scope, &retry).await?;
                Ok(retry)
            }
            Err(e) => Err(e),
        }
    }
}

fn generate_new_id(member_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", member_id, &suffix[..8])
}
