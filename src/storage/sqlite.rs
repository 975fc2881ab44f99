//! SQLite Persistent Ledger
//!
//! Durable storage for the payout ledger. Uses connection pooling via r2d2;
//! every operation checks out its own connection and runs a single
//! statement (or a read-then-write pair for the scan height).

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{LedgerStore, StorageError, StorageResult};
use crate::types::{
    Block, BlockStatus, Credit, CreditStatus, NewPayment, Payment, PaymentStatus, Share, User,
    UserBalance,
};

const BLOCK_COLUMNS: &str =
    "blk_id, height, txid, difficulty, time, uid, reward, reward_total, status";

const PAYMENT_COLUMNS: &str =
    "pymt_id, uid, txid, txhash, time, amount_paid, amount_fee, status";

/// SQLite-backed ledger with connection pooling
pub struct SqliteLedger {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLedger {
    /// Open (or create) the ledger at the given path and run migrations
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.run_migrations()?;

        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.run_migrations()?;

        Ok(ledger)
    }

    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run raw SQL against the ledger; lets tests simulate a failing store
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn run_migrations(&self) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY,
                wallet TEXT NOT NULL,
                payment_threshold INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS mined_blocks (
                blk_id INTEGER PRIMARY KEY AUTOINCREMENT,
                height INTEGER NOT NULL,
                txid TEXT NOT NULL,
                difficulty INTEGER NOT NULL,
                time INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                reward INTEGER,
                reward_total INTEGER,
                status INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS valid_shares (
                uid INTEGER NOT NULL,
                time INTEGER NOT NULL,
                count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credits (
                blk_id INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                time INTEGER NOT NULL,
                amount_reward INTEGER,
                amount_bonus INTEGER,
                amount_dev INTEGER,
                status INTEGER NOT NULL DEFAULT 0,
                UNIQUE (blk_id, uid)
            );

            CREATE TABLE IF NOT EXISTS payments (
                pymt_id INTEGER PRIMARY KEY AUTOINCREMENT,
                uid INTEGER NOT NULL,
                txid TEXT,
                txhash TEXT,
                time INTEGER NOT NULL,
                amount_paid INTEGER NOT NULL,
                amount_fee INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS scan_height (
                height INTEGER NOT NULL,
                time INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mined_blocks_status ON mined_blocks(status);
            CREATE INDEX IF NOT EXISTS idx_valid_shares_time ON valid_shares(time);
            CREATE INDEX IF NOT EXISTS idx_credits_uid_status ON credits(uid, status);
            CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
            CREATE INDEX IF NOT EXISTS idx_payments_uid ON payments(uid);

            INSERT INTO scan_height (height, time)
                SELECT 0, 0 WHERE NOT EXISTS (SELECT 1 FROM scan_height);
            "#,
        )?;

        Ok(())
    }

    fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<Block> {
        let code: i64 = row.get("status")?;
        let status = BlockStatus::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(8, code))?;

        Ok(Block {
            id: row.get("blk_id")?,
            height: row.get::<_, i64>("height")? as u64,
            txid: row.get("txid")?,
            difficulty: row.get::<_, i64>("difficulty")? as u64,
            time: row.get("time")?,
            miner_uid: row.get("uid")?,
            reward: row.get::<_, Option<i64>>("reward")?.map(|v| v as u64),
            reward_total: row.get::<_, Option<i64>>("reward_total")?.map(|v| v as u64),
            status,
        })
    }

    fn row_to_credit(row: &rusqlite::Row) -> rusqlite::Result<Credit> {
        let code: i64 = row.get("status")?;
        let status = CreditStatus::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, code))?;

        Ok(Credit {
            block_id: row.get("blk_id")?,
            miner_uid: row.get("uid")?,
            time: row.get("time")?,
            amount_reward: row.get::<_, Option<i64>>("amount_reward")?.map(|v| v as u64),
            amount_bonus: row.get::<_, Option<i64>>("amount_bonus")?.map(|v| v as u64),
            amount_dev: row.get::<_, Option<i64>>("amount_dev")?.map(|v| v as u64),
            status,
        })
    }

    fn row_to_payment(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
        let code: i64 = row.get("status")?;
        let status = PaymentStatus::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(7, code))?;

        Ok(Payment {
            id: row.get("pymt_id")?,
            miner_uid: row.get("uid")?,
            txid: row.get("txid")?,
            txhash: row.get("txhash")?,
            time: row.get("time")?,
            amount_paid: row.get::<_, i64>("amount_paid")? as u64,
            amount_fee: row.get::<_, i64>("amount_fee")? as u64,
            status,
        })
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        return err.extended_code == 1555 || err.extended_code == 2067;
    }
    false
}

impl LedgerStore for SqliteLedger {
    fn ping(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn insert_block(&self, block: &Block) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO mined_blocks (height, txid, difficulty, time, uid, reward, reward_total, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                block.height as i64,
                block.txid,
                block.difficulty as i64,
                block.time,
                block.miner_uid,
                block.reward.map(|v| v as i64),
                block.reward_total.map(|v| v as i64),
                block.status.code(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_block(&self, id: i64) -> StorageResult<Option<Block>> {
        let conn = self.conn()?;
        let block = conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM mined_blocks WHERE blk_id = ?1"),
                params![id],
                Self::row_to_block,
            )
            .optional()?;
        Ok(block)
    }

    fn blocks_by_status(&self, status: BlockStatus) -> StorageResult<Vec<Block>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM mined_blocks WHERE status = ?1 ORDER BY height, blk_id"
        ))?;
        let blocks = stmt
            .query_map(params![status.code()], Self::row_to_block)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn orphaned_blocks_with_live_credits(&self) -> StorageResult<Vec<Block>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM mined_blocks WHERE status = ?1 \
             AND EXISTS (SELECT 1 FROM credits c WHERE c.blk_id = mined_blocks.blk_id AND c.status <> ?2) \
             ORDER BY height, blk_id"
        ))?;
        let blocks = stmt
            .query_map(
                params![BlockStatus::Orphaned.code(), CreditStatus::Orphaned.code()],
                Self::row_to_block,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn unfinalized_blocks(&self) -> StorageResult<Vec<Block>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM mined_blocks WHERE status BETWEEN ?1 AND ?2 ORDER BY height, blk_id"
        ))?;
        let blocks = stmt
            .query_map(
                params![BlockStatus::Ok.code(), BlockStatus::Credited.code()],
                Self::row_to_block,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn set_block_reward(&self, id: i64, reward: u64, reward_total: u64) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE mined_blocks SET reward = ?1, reward_total = ?2 WHERE blk_id = ?3",
            params![reward as i64, reward_total as i64, id],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("block {}", id)));
        }
        Ok(())
    }

    fn set_block_status(&self, id: i64, status: BlockStatus) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE mined_blocks SET status = ?1 WHERE blk_id = ?2",
            params![status.code(), id],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("block {}", id)));
        }
        Ok(())
    }

    fn insert_share(&self, share: &Share) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO valid_shares (uid, time, count) VALUES (?1, ?2, ?3)",
            params![share.miner_uid, share.time, share.count as i64],
        )?;
        Ok(())
    }

    fn pplns_window_start(&self, end_time: i64, threshold: u64) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let start = conn
            .query_row(
                r#"
                SELECT time FROM (
                    SELECT time, SUM(count) OVER (ORDER BY time DESC) AS running_total
                    FROM valid_shares
                    WHERE time <= ?1
                )
                WHERE running_total >= ?2
                ORDER BY time DESC
                LIMIT 1
                "#,
                params![end_time, threshold as i64],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(start)
    }

    fn share_totals(&self, start_time: i64, end_time: i64) -> StorageResult<Vec<(i64, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT uid, SUM(count) FROM valid_shares
            WHERE time BETWEEN ?1 AND ?2
            GROUP BY uid
            ORDER BY uid
            "#,
        )?;
        let totals = stmt
            .query_map(params![start_time, end_time], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    fn insert_credit(&self, credit: &Credit) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO credits (blk_id, uid, time, amount_reward, amount_bonus, amount_dev, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                credit.block_id,
                credit.miner_uid,
                credit.time,
                credit.amount_reward.map(|v| v as i64),
                credit.amount_bonus.map(|v| v as i64),
                credit.amount_dev.map(|v| v as i64),
                credit.status.code(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(format!(
                    "credit for block {} miner {}",
                    credit.block_id, credit.miner_uid
                ));
            }
            StorageError::Database(e.to_string())
        })?;
        Ok(())
    }

    fn credits_for_block(&self, block_id: i64) -> StorageResult<Vec<Credit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT blk_id, uid, time, amount_reward, amount_bonus, amount_dev, status
            FROM credits WHERE blk_id = ?1 ORDER BY uid
            "#,
        )?;
        let credits = stmt
            .query_map(params![block_id], Self::row_to_credit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(credits)
    }

    fn set_credit_status(&self, block_id: i64, status: CreditStatus) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE credits SET status = ?1 WHERE blk_id = ?2 AND status <> ?1",
            params![status.code(), block_id],
        )?;
        Ok(rows)
    }

    fn insert_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (uid, wallet, payment_threshold) VALUES (?1, ?2, ?3)",
            params![user.uid, user.wallet_address, user.payment_threshold as i64],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(format!("user {}", user.uid));
            }
            StorageError::Database(e.to_string())
        })?;
        Ok(())
    }

    fn user_balances(&self) -> StorageResult<Vec<UserBalance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                u.uid,
                u.wallet,
                u.payment_threshold,
                COALESCE(pending.sum, 0),
                COALESCE(matured.sum, 0),
                COALESCE(debits.sum, 0)
            FROM users AS u
            LEFT JOIN (
                SELECT uid, SUM(COALESCE(amount_reward, 0) + COALESCE(amount_bonus, 0) + COALESCE(amount_dev, 0)) AS sum
                FROM credits WHERE status = ?1 GROUP BY uid
            ) AS pending ON pending.uid = u.uid
            LEFT JOIN (
                SELECT uid, SUM(COALESCE(amount_reward, 0) + COALESCE(amount_bonus, 0) + COALESCE(amount_dev, 0)) AS sum
                FROM credits WHERE status = ?2 GROUP BY uid
            ) AS matured ON matured.uid = u.uid
            LEFT JOIN (
                SELECT uid, SUM(amount_paid + amount_fee) AS sum
                FROM payments WHERE status <> ?3 GROUP BY uid
            ) AS debits ON debits.uid = u.uid
            ORDER BY u.uid
            "#,
        )?;
        let balances = stmt
            .query_map(
                params![
                    CreditStatus::Pending.code(),
                    CreditStatus::Matured.code(),
                    PaymentStatus::Orphaned.code(),
                ],
                |row| {
                    Ok(UserBalance {
                        uid: row.get(0)?,
                        wallet_address: row.get(1)?,
                        payment_threshold: row.get::<_, i64>(2)? as u64,
                        credits_pending: row.get::<_, i64>(3)? as u64,
                        credits_matured: row.get::<_, i64>(4)? as u64,
                        debits: row.get::<_, i64>(5)? as u64,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(balances)
    }

    fn insert_payment(&self, payment: &NewPayment) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO payments (uid, txid, time, amount_paid, amount_fee, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                payment.miner_uid,
                payment.txid,
                payment.time,
                payment.amount_paid as i64,
                payment.amount_fee as i64,
                PaymentStatus::Pending.code(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_payment(&self, id: i64) -> StorageResult<Option<Payment>> {
        let conn = self.conn()?;
        let payment = conn
            .query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE pymt_id = ?1"),
                params![id],
                Self::row_to_payment,
            )
            .optional()?;
        Ok(payment)
    }

    fn pending_payments(&self) -> StorageResult<Vec<Payment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status = ?1 ORDER BY pymt_id"
        ))?;
        let payments = stmt
            .query_map(params![PaymentStatus::Pending.code()], Self::row_to_payment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(payments)
    }

    fn update_payment(
        &self,
        id: i64,
        txid: Option<&str>,
        txhash: Option<&str>,
        status: PaymentStatus,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE payments SET txid = ?1, txhash = ?2, status = ?3 WHERE pymt_id = ?4",
            params![txid, txhash, status.code(), id],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("payment {}", id)));
        }
        Ok(())
    }

    fn backfill_payment(&self, id: i64, txid: &str, txhash: &str, amount_fee: u64) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE payments SET txid = ?1, txhash = ?2, amount_fee = ?3 WHERE pymt_id = ?4",
            params![txid, txhash, amount_fee as i64, id],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("payment {}", id)));
        }
        Ok(())
    }

    fn scan_height(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT height FROM scan_height")?;
        let heights = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        match heights.len() {
            0 => {
                tracing::warn!(target: "payoutd::system", "scan_height table is empty, starting from 0");
                Ok(0)
            }
            1 => Ok(heights[0].max(0) as u64),
            n => {
                let lowest = heights.iter().copied().min().unwrap_or(0).max(0) as u64;
                tracing::warn!(
                    target: "payoutd::system",
                    rows = n,
                    height = lowest,
                    "scan_height table has several rows, using the lowest"
                );
                Ok(lowest)
            }
        }
    }

    fn set_scan_height(&self, height: u64, time: i64) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE scan_height SET height = ?1, time = ?2",
            params![height as i64, time],
        )?;
        if rows == 0 {
            conn.execute(
                "INSERT INTO scan_height (height, time) VALUES (?1, ?2)",
                params![height as i64, time],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SqliteLedger {
        SqliteLedger::in_memory().unwrap()
    }

    fn share(uid: i64, time: i64, count: u64) -> Share {
        Share { miner_uid: uid, time, count }
    }

    fn credit(block_id: i64, uid: i64, reward: u64, status: CreditStatus) -> Credit {
        Credit {
            block_id,
            miner_uid: uid,
            time: 0,
            amount_reward: Some(reward),
            amount_bonus: None,
            amount_dev: None,
            status,
        }
    }

    #[test]
    fn test_insert_and_get_block() {
        let ledger = ledger();
        let id = ledger.insert_block(&Block::new(100, "aa", 50, 1000, 7)).unwrap();

        let block = ledger.get_block(id).unwrap().unwrap();
        assert_eq!(block.height, 100);
        assert_eq!(block.status, BlockStatus::Ok);
        assert_eq!(block.reward, None);

        ledger.set_block_reward(id, 900, 1000).unwrap();
        ledger.set_block_status(id, BlockStatus::TxSeen).unwrap();

        let block = ledger.get_block(id).unwrap().unwrap();
        assert_eq!(block.reward, Some(900));
        assert_eq!(block.reward_total, Some(1000));
        assert_eq!(block.status, BlockStatus::TxSeen);
    }

    #[test]
    fn test_unfinalized_blocks_range() {
        let ledger = ledger();
        for (height, status) in [
            (1, BlockStatus::Orphaned),
            (2, BlockStatus::Ok),
            (3, BlockStatus::TxSeen),
            (4, BlockStatus::Credited),
            (5, BlockStatus::Matured),
            (6, BlockStatus::Closed),
        ] {
            let mut block = Block::new(height, format!("tx{}", height), 1, 0, 1);
            block.status = status;
            ledger.insert_block(&block).unwrap();
        }

        let heights: Vec<u64> = ledger
            .unfinalized_blocks()
            .unwrap()
            .iter()
            .map(|b| b.height)
            .collect();
        assert_eq!(heights, vec![2, 3, 4]);
    }

    #[test]
    fn test_missing_block_update() {
        let ledger = ledger();
        let result = ledger.set_block_status(42, BlockStatus::TxSeen);
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_pplns_window_start() {
        let ledger = ledger();
        ledger.insert_share(&share(1, 10, 40)).unwrap();
        ledger.insert_share(&share(2, 20, 30)).unwrap();
        ledger.insert_share(&share(1, 30, 30)).unwrap();
        // After the block, never counted
        ledger.insert_share(&share(2, 40, 1000)).unwrap();

        assert_eq!(ledger.pplns_window_start(30, 30).unwrap(), Some(30));
        assert_eq!(ledger.pplns_window_start(30, 31).unwrap(), Some(20));
        assert_eq!(ledger.pplns_window_start(30, 100).unwrap(), Some(10));
        assert_eq!(ledger.pplns_window_start(30, 101).unwrap(), None);
    }

    #[test]
    fn test_pplns_window_grows_with_threshold() {
        let ledger = ledger();
        for t in 1..=20 {
            ledger.insert_share(&share(t % 3, t, 5)).unwrap();
        }

        let mut last_start = i64::MAX;
        for threshold in (5..=100).step_by(5) {
            let start = ledger.pplns_window_start(20, threshold).unwrap().unwrap();
            assert!(start <= last_start);
            last_start = start;
        }
    }

    #[test]
    fn test_share_totals() {
        let ledger = ledger();
        ledger.insert_share(&share(1, 10, 40)).unwrap();
        ledger.insert_share(&share(2, 20, 30)).unwrap();
        ledger.insert_share(&share(1, 30, 30)).unwrap();

        assert_eq!(ledger.share_totals(20, 30).unwrap(), vec![(1, 30), (2, 30)]);
        assert_eq!(ledger.share_totals(0, 30).unwrap(), vec![(1, 70), (2, 30)]);
    }

    #[test]
    fn test_duplicate_credit() {
        let ledger = ledger();
        ledger.insert_credit(&credit(1, 7, 100, CreditStatus::Pending)).unwrap();
        let result = ledger.insert_credit(&credit(1, 7, 100, CreditStatus::Pending));
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[test]
    fn test_set_credit_status() {
        let ledger = ledger();
        ledger.insert_credit(&credit(1, 7, 100, CreditStatus::Pending)).unwrap();
        ledger.insert_credit(&credit(1, 8, 50, CreditStatus::Pending)).unwrap();
        ledger.insert_credit(&credit(2, 7, 10, CreditStatus::Pending)).unwrap();

        assert_eq!(ledger.set_credit_status(1, CreditStatus::Matured).unwrap(), 2);

        let credits = ledger.credits_for_block(1).unwrap();
        assert!(credits.iter().all(|c| c.status == CreditStatus::Matured));
        assert_eq!(ledger.credits_for_block(2).unwrap()[0].status, CreditStatus::Pending);
    }

    #[test]
    fn test_orphaned_blocks_with_live_credits() {
        let ledger = ledger();
        let mut block = Block::new(100, "aa", 50, 1000, 7);
        block.status = BlockStatus::Orphaned;
        let voided = ledger.insert_block(&block).unwrap();
        let live = ledger.insert_block(&Block { height: 101, txid: "bb".to_string(), ..block.clone() }).unwrap();
        ledger.insert_block(&Block { height: 102, txid: "cc".to_string(), ..block }).unwrap();

        ledger.insert_credit(&credit(voided, 7, 100, CreditStatus::Orphaned)).unwrap();
        ledger.insert_credit(&credit(live, 7, 100, CreditStatus::Orphaned)).unwrap();
        ledger.insert_credit(&credit(live, 8, 100, CreditStatus::Pending)).unwrap();

        let blocks = ledger.orphaned_blocks_with_live_credits().unwrap();
        assert_eq!(blocks.iter().map(|b| b.id).collect::<Vec<_>>(), vec![live]);

        ledger.set_credit_status(live, CreditStatus::Orphaned).unwrap();
        assert!(ledger.orphaned_blocks_with_live_credits().unwrap().is_empty());
    }

    #[test]
    fn test_user_balances() {
        let ledger = ledger();
        ledger
            .insert_user(&User { uid: 7, wallet_address: "addr7".into(), payment_threshold: 10 })
            .unwrap();
        ledger
            .insert_user(&User { uid: 8, wallet_address: "addr8".into(), payment_threshold: 0 })
            .unwrap();

        ledger.insert_credit(&credit(1, 7, 100, CreditStatus::Matured)).unwrap();
        ledger.insert_credit(&credit(2, 7, 40, CreditStatus::Pending)).unwrap();
        ledger.insert_credit(&credit(3, 7, 999, CreditStatus::Orphaned)).unwrap();

        let paid = ledger
            .insert_payment(&NewPayment {
                miner_uid: 7,
                txid: Some("t1".into()),
                time: 0,
                amount_paid: 20,
                amount_fee: 1,
            })
            .unwrap();
        let orphaned = ledger
            .insert_payment(&NewPayment {
                miner_uid: 7,
                txid: Some("t2".into()),
                time: 0,
                amount_paid: 30,
                amount_fee: 1,
            })
            .unwrap();
        ledger
            .update_payment(orphaned, Some("t2"), None, PaymentStatus::Orphaned)
            .unwrap();
        assert!(paid < orphaned);

        let balances = ledger.user_balances().unwrap();
        assert_eq!(balances.len(), 2);

        let b7 = &balances[0];
        assert_eq!(b7.credits_matured, 100);
        assert_eq!(b7.credits_pending, 40);
        assert_eq!(b7.debits, 21);
        assert_eq!(b7.confirmed_balance(), 79);

        let b8 = &balances[1];
        assert_eq!((b8.credits_pending, b8.credits_matured, b8.debits), (0, 0, 0));
    }

    #[test]
    fn test_payment_lifecycle() {
        let ledger = ledger();
        let id = ledger
            .insert_payment(&NewPayment {
                miner_uid: 7,
                txid: None,
                time: 5,
                amount_paid: 500,
                amount_fee: 3,
            })
            .unwrap();

        let pending = ledger.pending_payments().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].txid, None);

        ledger.backfill_payment(id, "tx", "hash", 2).unwrap();
        let payment = ledger.get_payment(id).unwrap().unwrap();
        assert_eq!(payment.txid.as_deref(), Some("tx"));
        assert_eq!(payment.txhash.as_deref(), Some("hash"));
        assert_eq!(payment.amount_fee, 2);
        assert_eq!(payment.status, PaymentStatus::Pending);

        ledger
            .update_payment(id, Some("tx"), Some("hash"), PaymentStatus::Matured)
            .unwrap();
        assert!(ledger.pending_payments().unwrap().is_empty());
    }

    #[test]
    fn test_scan_height() {
        let ledger = ledger();
        assert_eq!(ledger.scan_height().unwrap(), 0);

        ledger.set_scan_height(1234, 99).unwrap();
        assert_eq!(ledger.scan_height().unwrap(), 1234);
    }

    #[test]
    fn test_scan_height_uses_lowest_row() {
        let ledger = ledger();
        ledger.set_scan_height(500, 0).unwrap();
        {
            let conn = ledger.conn().unwrap();
            conn.execute("INSERT INTO scan_height (height, time) VALUES (300, 0)", [])
                .unwrap();
        }
        assert_eq!(ledger.scan_height().unwrap(), 300);
    }

    #[test]
    fn test_scan_height_empty_table() {
        let ledger = ledger();
        {
            let conn = ledger.conn().unwrap();
            conn.execute("DELETE FROM scan_height", []).unwrap();
        }
        assert_eq!(ledger.scan_height().unwrap(), 0);

        ledger.set_scan_height(10, 0).unwrap();
        assert_eq!(ledger.scan_height().unwrap(), 10);
    }

    #[test]
    fn test_file_backed_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let ledger = SqliteLedger::new(&path).unwrap();
            ledger.set_scan_height(77, 0).unwrap();
        }

        let ledger = SqliteLedger::new(&path).unwrap();
        assert_eq!(ledger.scan_height().unwrap(), 77);
        ledger.ping().unwrap();
    }
}
