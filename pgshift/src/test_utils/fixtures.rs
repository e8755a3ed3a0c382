//! Dump text shaped like `pg_dump --format=p` output for a small two-schema database.

pub const PRE_DATA_DUMP: &str = r#"--
-- PostgreSQL database dump
--

\restrict 5fHQfGkDmbIwdVfqcjKNrhbnxPGrE6b

SET statement_timeout = 0;
SET lock_timeout = 0;
SET client_encoding = 'UTF8';
SET standard_conforming_strings = on;
SELECT pg_catalog.set_config('search_path', '', false);

--
-- Name: excluded; Type: SCHEMA; Schema: -; Owner: postgres
--

CREATE SCHEMA excluded;

--
-- Name: included; Type: SCHEMA; Schema: -; Owner: postgres
--

CREATE SCHEMA included;

--
-- Name: public; Type: SCHEMA; Schema: -; Owner: pg_database_owner
--

CREATE SCHEMA public;

SET default_tablespace = '';

--
-- Name: table_to_replicate3; Type: TABLE; Schema: excluded; Owner: postgres
--

CREATE TABLE excluded.table_to_replicate3 (
    id integer NOT NULL,
    name text
);

--
-- Name: table_to_replicate; Type: TABLE; Schema: included; Owner: postgres
--

CREATE TABLE included.table_to_replicate (
    id integer NOT NULL,
    name text
);

--
-- Name: table_to_replicate2; Type: TABLE; Schema: included; Owner: postgres
--

CREATE TABLE included.table_to_replicate2 (
    id integer NOT NULL,
    parent_id integer,
    name text
);

--
-- PostgreSQL database dump complete
--

\unrestrict 5fHQfGkDmbIwdVfqcjKNrhbnxPGrE6b
"#;

pub const POST_DATA_DUMP: &str = r#"--
-- PostgreSQL database dump
--

\restrict 5fHQfGkDmbIwdVfqcjKNrhbnxPGrE6b

SET statement_timeout = 0;
SELECT pg_catalog.set_config('search_path', '', false);

--
-- Name: table_to_replicate3 table_to_replicate3_pkey; Type: CONSTRAINT; Schema: excluded; Owner: postgres
--

ALTER TABLE ONLY excluded.table_to_replicate3
    ADD CONSTRAINT table_to_replicate3_pkey PRIMARY KEY (id);

--
-- Name: table_to_replicate table_to_replicate_pkey; Type: CONSTRAINT; Schema: included; Owner: postgres
--

ALTER TABLE ONLY included.table_to_replicate
    ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);

--
-- Name: table_to_replicate2 table_to_replicate2_pkey; Type: CONSTRAINT; Schema: included; Owner: postgres
--

ALTER TABLE ONLY included.table_to_replicate2
    ADD CONSTRAINT table_to_replicate2_pkey PRIMARY KEY (id);

--
-- Name: table_to_replicate_name_idx; Type: INDEX; Schema: included; Owner: postgres
--

CREATE INDEX table_to_replicate_name_idx ON included.table_to_replicate USING btree (name);

--
-- Name: table_to_replicate2 table_to_replicate2_parent_fkey; Type: FK CONSTRAINT; Schema: included; Owner: postgres
--

ALTER TABLE ONLY included.table_to_replicate2
    ADD CONSTRAINT table_to_replicate2_parent_fkey FOREIGN KEY (parent_id) REFERENCES included.table_to_replicate(id);

--
-- PostgreSQL database dump complete
--

\unrestrict 5fHQfGkDmbIwdVfqcjKNrhbnxPGrE6b
"#;
